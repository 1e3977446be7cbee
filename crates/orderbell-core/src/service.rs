// ── Realtime service ──
//
// Process-wide facade over the transport. Pages subscribe here instead of
// on the transport: the service holds one forwarding subscription per
// order event for its whole lifetime, which keeps the persistent channel
// open while pages come and go.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use orderbell_api::{OrdersClient, Session, StreamClient};
use serde::Serialize;
use tracing::{debug, info};

use crate::bus::{Callback, EventBus, Subscription, callback};
use crate::config::RealtimeConfig;
use crate::error::CoreError;
use crate::model::{ConnectionState, EventKind, PendingOrderEvent};
use crate::transport::RealtimeTransport;

/// Event kinds pages may subscribe to through the service.
pub const FORWARDED_KINDS: [EventKind; 3] = [
    EventKind::OrderCreated,
    EventKind::OrderUpdated,
    EventKind::OrderStatusChanged,
];

/// Point-in-time view of the service for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub state: ConnectionState,
    pub polling: bool,
    pub reconnect_attempts: u32,
    pub reconnect_scheduled: bool,
    /// Consecutive streams dropped shortly after opening.
    pub short_lived_streams: u32,
    pub cached_pending: Option<u64>,
    /// Page subscribers per event kind.
    pub subscribers: IndexMap<EventKind, usize>,
    /// Connection-status observers.
    pub observers: usize,
}

struct ServiceInner {
    transport: RealtimeTransport,
    pages: EventBus,
    observers: EventBus,
    forwarders: Mutex<Vec<Subscription>>,
}

impl ServiceInner {
    fn forwarders(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.forwarders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The global order-notification manager.
///
/// Cheaply cloneable; construct once and share.
#[derive(Clone)]
pub struct RealtimeService {
    inner: Arc<ServiceInner>,
}

impl RealtimeService {
    pub fn new(transport: RealtimeTransport) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                transport,
                pages: EventBus::new(),
                observers: EventBus::new(),
                forwarders: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Wire the production API clients into a service.
    pub fn from_config(config: RealtimeConfig, session: Session) -> Result<Self, CoreError> {
        let transport_config = config.transport_config();
        let stream = StreamClient::new(config.api_url.clone(), &transport_config)?;
        let orders = OrdersClient::new(config.api_url.clone(), session.clone(), &transport_config)?;
        let transport = RealtimeTransport::new(
            config,
            Arc::new(stream),
            Arc::new(orders),
            Arc::new(session),
        );
        Ok(Self::new(transport))
    }

    pub fn transport(&self) -> &RealtimeTransport {
        &self.inner.transport
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Install the forwarders and start the transport. Idempotent.
    pub async fn start(&self) {
        self.install_forwarders();
        self.inner.transport.start().await;
    }

    /// Remove the forwarders and stop the transport.
    pub fn stop(&self) {
        let forwarders: Vec<Subscription> = self.inner.forwarders().drain(..).collect();
        for sub in &forwarders {
            sub.unsubscribe();
        }
        self.inner.transport.stop();
        info!("realtime service stopped");
    }

    fn install_forwarders(&self) {
        let mut forwarders = self.inner.forwarders();
        if !forwarders.is_empty() {
            return;
        }
        let transport = &self.inner.transport;

        for kind in FORWARDED_KINDS {
            let pages = self.inner.pages.clone();
            forwarders.push(transport.subscribe(
                kind,
                callback(move |event| {
                    pages.emit(event);
                }),
            ));
        }

        let observers = self.inner.observers.clone();
        forwarders.push(transport.subscribe(
            EventKind::ConnectionStateChange,
            callback(move |event| {
                observers.emit(event);
            }),
        ));
        debug!(count = forwarders.len(), "forwarders installed");
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Subscribe a page to an order event.
    pub fn subscribe(&self, kind: EventKind, callback: Callback) -> Result<Subscription, CoreError> {
        if !FORWARDED_KINDS.contains(&kind) {
            return Err(CoreError::UnsupportedEvent { kind });
        }
        Ok(self.inner.pages.subscribe(kind, callback))
    }

    pub fn unsubscribe(&self, kind: EventKind, callback: &Callback) -> bool {
        self.inner.pages.unsubscribe(kind, callback)
    }

    /// Observe connection state changes.
    pub fn on_connection_change(&self, callback: Callback) -> Subscription {
        self.inner
            .observers
            .subscribe(EventKind::ConnectionStateChange, callback)
    }

    /// Observe the session being given up after a failed refresh.
    pub fn on_auth_failure(&self, callback: Callback) -> Subscription {
        self.inner.transport.subscribe(EventKind::AuthFailure, callback)
    }

    /// Observe published pending counts.
    pub fn on_pending_count(&self, callback: Callback) -> Subscription {
        self.inner.transport.subscribe(EventKind::PendingCount, callback)
    }

    /// Whether any page subscriber or connection-status observer remains.
    pub fn has_subscribers(&self) -> bool {
        self.inner.pages.has_subscribers() || self.inner.observers.has_subscribers()
    }

    // ── Queries and passthroughs ─────────────────────────────────────

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.transport.state()
    }

    pub fn stats(&self) -> ServiceStats {
        let transport = &self.inner.transport;
        ServiceStats {
            state: transport.state(),
            polling: transport.is_polling(),
            reconnect_attempts: transport.reconnect_attempts(),
            reconnect_scheduled: transport.reconnect_scheduled(),
            short_lived_streams: transport.short_lived_streams(),
            cached_pending: transport.pending().current(),
            subscribers: self.inner.pages.counts(),
            observers: self
                .inner
                .observers
                .subscriber_count(EventKind::ConnectionStateChange),
        }
    }

    pub async fn pending_orders_count(&self, force: bool) -> u64 {
        self.inner.transport.pending().get(force).await
    }

    pub fn refresh_pending_orders_count(&self, force: bool) {
        self.inner.transport.pending().refresh(force);
    }

    /// The newest pending orders, normalized.
    pub async fn pending_orders(&self, limit: u32) -> Result<Vec<PendingOrderEvent>, CoreError> {
        let page = self.inner.transport.orders().recent_pending(limit).await?;
        self.inner.transport.pending().store(page.pagination.total_orders);
        let now = chrono::Utc::now();
        Ok(page
            .orders
            .iter()
            .map(|record| PendingOrderEvent::from_record(record, now))
            .collect())
    }

    pub async fn force_reconnect(&self) {
        self.inner.transport.force_reconnect().await;
    }
}
