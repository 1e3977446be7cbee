// ── Real-time transport ──
//
// Owns the single server-push channel for order notifications. Opens the
// SSE stream, normalizes what it delivers onto the event bus, falls back
// to periodic polling when the stream is down, reconnects with backoff,
// and recovers once from an expired credential before giving up.
//
// Background work (stream reader, poller, reconnect timer, health check)
// runs as tokio tasks under child tokens of one root `CancellationToken`.
// `stop()` cancels the root; `start()` replaces it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use orderbell_api::{Credential, EnvelopeStream, StreamEnvelope};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::bus::{Callback, EventBus, Subscription};
use crate::config::RealtimeConfig;
use crate::model::{
    ConnectionState, EnvelopeError, EventKind, PendingOrderEvent, RealtimeEvent,
};
use crate::reconnect::{FailureKind, classify_failure};
use crate::source::{EventStreamConnector, OrderSource, SessionAuth};
use crate::store::{PendingCountCache, PollCursor};

/// A stream that stays up this long is not counted as flapping.
const STABLE_STREAM: Duration = Duration::from_secs(10);

/// Why the channel went down.
#[derive(Debug)]
struct Failure {
    reason: String,
    /// The server ended the stream before delivering anything.
    closed_immediately: bool,
}

/// Mutable link bookkeeping, guarded by one lock.
///
/// Never held across an await or while emitting events.
struct LinkState {
    root: CancellationToken,
    started: bool,
    /// Bumped by every disconnect; a handshake that finishes under an
    /// older generation is discarded.
    generation: u64,
    connecting: bool,
    attempts: u32,
    refresh_attempted: bool,
    auth_failed: bool,
    reader: Option<CancellationToken>,
    poller: Option<CancellationToken>,
    reconnect: Option<CancellationToken>,
    /// Consecutive streams that dropped within `STABLE_STREAM`.
    short_lived: u32,
    cursor: PollCursor,
}

impl LinkState {
    fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            started: false,
            generation: 0,
            connecting: false,
            attempts: 0,
            refresh_attempted: false,
            auth_failed: false,
            reader: None,
            poller: None,
            reconnect: None,
            short_lived: 0,
            cursor: PollCursor::starting_at(Utc::now()),
        }
    }

    fn cancel_channels(&mut self) {
        for token in [
            self.reader.take(),
            self.poller.take(),
            self.reconnect.take(),
        ]
        .into_iter()
        .flatten()
        {
            token.cancel();
        }
    }
}

struct TransportInner {
    config: RealtimeConfig,
    connector: Arc<dyn EventStreamConnector>,
    orders: Arc<dyn OrderSource>,
    auth: Arc<dyn SessionAuth>,
    bus: EventBus,
    pending: PendingCountCache,
    state: watch::Sender<ConnectionState>,
    link: Mutex<LinkState>,
}

impl TransportInner {
    fn link(&self) -> MutexGuard<'_, LinkState> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The order-notification channel.
///
/// Cheaply cloneable via `Arc<TransportInner>`. Construct once per
/// process and share it.
#[derive(Clone)]
pub struct RealtimeTransport {
    inner: Arc<TransportInner>,
}

impl RealtimeTransport {
    /// Create a transport. Does NOT connect: call [`start()`](Self::start)
    /// or [`connect()`](Self::connect).
    pub fn new(
        config: RealtimeConfig,
        connector: Arc<dyn EventStreamConnector>,
        orders: Arc<dyn OrderSource>,
        auth: Arc<dyn SessionAuth>,
    ) -> Self {
        let bus = EventBus::new();
        let pending = PendingCountCache::new(
            Arc::clone(&orders),
            bus.clone(),
            config.pending_ttl,
            config.pending_debounce,
        );
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        let transport = Self {
            inner: Arc::new(TransportInner {
                config,
                connector,
                orders,
                auth,
                bus,
                pending,
                state,
                link: Mutex::new(LinkState::new()),
            }),
        };

        let weak = Arc::downgrade(&transport.inner);
        transport
            .inner
            .bus
            .set_activation_hook(move || on_first_subscriber(&weak));
        transport
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn pending(&self) -> &PendingCountCache {
        &self.inner.pending
    }

    pub fn orders(&self) -> &Arc<dyn OrderSource> {
        &self.inner.orders
    }

    pub fn subscribe(&self, kind: EventKind, callback: Callback) -> Subscription {
        self.inner.bus.subscribe(kind, callback)
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_polling(&self) -> bool {
        self.inner.link().poller.is_some()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.link().attempts
    }

    pub fn reconnect_scheduled(&self) -> bool {
        self.inner.link().reconnect.is_some()
    }

    /// Consecutive streams the server dropped shortly after opening.
    pub fn short_lived_streams(&self) -> u32 {
        self.inner.link().short_lived
    }

    pub fn is_started(&self) -> bool {
        self.inner.link().started
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Begin managing the channel: spawn the health check and connect.
    pub async fn start(&self) {
        let health = {
            let mut link = self.inner.link();
            if link.started {
                debug!("transport already started");
                return;
            }
            if link.root.is_cancelled() {
                link.root = CancellationToken::new();
            }
            link.started = true;
            link.auth_failed = false;
            link.root.child_token()
        };
        info!(api = %self.inner.config.api_url, "starting order notifications");

        tokio::spawn(self.clone().health_task(health));
        self.connect().await;
    }

    /// Tear everything down. The transport stays inert until the next
    /// [`start()`](Self::start).
    pub fn stop(&self) {
        {
            let mut link = self.inner.link();
            link.started = false;
            link.root.cancel();
            link.cancel_channels();
            link.generation += 1;
            link.connecting = false;
            link.attempts = 0;
            link.refresh_attempted = false;
            link.short_lived = 0;
        }
        self.set_state(ConnectionState::Disconnected);
        info!("order notifications stopped");
    }

    /// Open the stream unless it is already open or opening.
    ///
    /// Resolves once the handshake has succeeded or failed. On failure the
    /// state goes to `Error`, polling starts, and either a credential
    /// refresh or a backoff reconnect is scheduled.
    pub fn connect(&self) -> BoxFuture<'static, ()> {
        let transport = self.clone();
        Box::pin(async move { transport.connect_inner().await })
    }

    async fn connect_inner(self) {
        let generation = {
            let mut link = self.inner.link();
            if link.root.is_cancelled() {
                debug!("connect ignored: transport stopped");
                return;
            }
            if link.connecting || self.state() == ConnectionState::Connected {
                debug!("connect ignored: already connecting or connected");
                return;
            }
            link.connecting = true;
            if let Some(timer) = link.reconnect.take() {
                timer.cancel();
            }
            link.generation
        };
        self.set_state(ConnectionState::Connecting);

        let credential = self.inner.auth.credential();
        let timeout = self.inner.config.handshake_timeout;
        let outcome = tokio::time::timeout(
            timeout,
            self.inner.connector.open(credential.as_ref()),
        )
        .await
        .unwrap_or(Err(orderbell_api::Error::Timeout {
            timeout_secs: timeout.as_secs(),
        }));

        {
            let mut link = self.inner.link();
            if link.generation != generation {
                debug!("handshake finished after disconnect; discarding");
                return;
            }
            link.connecting = false;
        }

        match outcome {
            Ok(stream) => self.on_open(stream),
            Err(e) => self.on_failure(
                &Failure {
                    reason: e.to_string(),
                    closed_immediately: e.is_immediate_close(),
                },
                credential.as_ref(),
            ),
        }
    }

    /// Close the channel.
    ///
    /// A persistent transport with live subscribers ignores non-forced
    /// requests. Returns whether the channel was closed.
    pub fn disconnect(&self, force: bool) -> bool {
        if !force && self.inner.config.persistent && self.inner.bus.has_subscribers() {
            debug!(
                subscribers = ?self.inner.bus.counts(),
                "keeping persistent channel open"
            );
            return false;
        }
        {
            let mut link = self.inner.link();
            link.cancel_channels();
            link.generation += 1;
            link.connecting = false;
            link.attempts = 0;
        }
        self.set_state(ConnectionState::Disconnected);
        info!(force, "order channel closed");
        true
    }

    /// Drop whatever channel exists and connect afresh with a clean
    /// attempt budget.
    pub async fn force_reconnect(&self) {
        info!("forcing reconnect");
        self.disconnect(true);
        {
            let mut link = self.inner.link();
            link.attempts = 0;
            link.refresh_attempted = false;
            link.auth_failed = false;
        }
        self.connect().await;
    }

    // ── Stream handling ──────────────────────────────────────────────

    fn on_open(&self, stream: EnvelopeStream) {
        let token = {
            let mut link = self.inner.link();
            link.attempts = 0;
            link.refresh_attempted = false;
            link.auth_failed = false;
            link.cancel_channels();
            let token = link.root.child_token();
            link.reader = Some(token.clone());
            token
        };
        info!("order stream open");
        self.set_state(ConnectionState::Connected);
        tokio::spawn(self.clone().read_loop(stream, token));
    }

    async fn read_loop(self, mut stream: EnvelopeStream, token: CancellationToken) {
        let opened_at = Instant::now();
        let mut delivered = false;
        let error = loop {
            tokio::select! {
                biased;
                () = token.cancelled() => return,
                next = stream.next() => match next {
                    Some(Ok(envelope)) => {
                        delivered = true;
                        self.dispatch(&envelope);
                    }
                    Some(Err(e)) => break e,
                    None => break orderbell_api::Error::StreamClosed,
                },
            }
        };
        let failure = Failure {
            reason: error.to_string(),
            closed_immediately: !delivered,
        };

        let lived = opened_at.elapsed();
        {
            let mut link = self.inner.link();
            if token.is_cancelled() {
                return;
            }
            link.reader = None;
            if lived < STABLE_STREAM {
                link.short_lived += 1;
                if link.short_lived > 1 {
                    warn!(
                        consecutive = link.short_lived,
                        lived_ms = lived.as_millis(),
                        "order stream keeps dropping right after opening"
                    );
                }
            } else {
                link.short_lived = 0;
            }
        }
        let credential = self.inner.auth.credential();
        self.on_failure(&failure, credential.as_ref());
    }

    /// Normalize one envelope, update local state, and publish it.
    fn dispatch(&self, envelope: &StreamEnvelope) {
        let event = match RealtimeEvent::from_envelope(envelope, Utc::now()) {
            Ok(event) => event,
            Err(EnvelopeError::UnknownType(kind)) => {
                debug!(kind = %kind, "ignoring unrecognized stream message");
                return;
            }
            Err(EnvelopeError::Malformed { kind, reason }) => {
                debug!(event = %kind, reason = %reason, "dropping malformed stream message");
                return;
            }
        };

        match &event {
            RealtimeEvent::Connected { message } => {
                debug!(?message, "stream handshake acknowledged");
                self.inner.pending.refresh(true);
            }
            RealtimeEvent::OrderCreated(order) => {
                info!(order_id = %order.order_id, customer = %order.customer_name, "new order");
                if let Some(at) = order.reported_placed_at() {
                    self.inner.link().cursor.observe(at);
                }
                self.inner.pending.refresh(false);
            }
            RealtimeEvent::OrderUpdated(update) | RealtimeEvent::OrderStatusChanged(update) => {
                debug!(order_id = %update.order_id, status = ?update.status, "order changed");
                self.inner.pending.refresh(false);
            }
            RealtimeEvent::PendingCount(count) => self.inner.pending.store(*count),
            RealtimeEvent::Ping => trace!("keep-alive"),
            RealtimeEvent::ConnectionStateChanged(_) | RealtimeEvent::AuthFailure { .. } => {}
        }
        self.inner.bus.emit(&event);
    }

    // ── Failure handling ─────────────────────────────────────────────

    fn on_failure(&self, failure: &Failure, credential: Option<&Credential>) {
        if self.inner.link().root.is_cancelled() {
            return;
        }
        warn!(
            reason = %failure.reason,
            closed_immediately = failure.closed_immediately,
            "order stream failed"
        );
        self.set_state(ConnectionState::Error);
        self.start_polling();

        match classify_failure(failure.closed_immediately, credential, Utc::now()) {
            FailureKind::CredentialExpired => self.recover_credential(),
            FailureKind::Other => self.schedule_reconnect(),
        }
    }

    /// One refresh attempt per connection cycle; a second expiry gives up.
    fn recover_credential(&self) {
        let (first, token) = {
            let mut link = self.inner.link();
            let first = !link.refresh_attempted;
            link.refresh_attempted = true;
            (first, link.root.child_token())
        };
        if !first {
            self.fail_auth("credential rejected again after refresh".into());
            return;
        }

        info!("credential looks expired; refreshing");
        let transport = self.clone();
        tokio::spawn(async move {
            let result = transport.inner.auth.refresh().await;
            if token.is_cancelled() {
                debug!("transport stopped during credential refresh");
                return;
            }
            match result {
                Ok(_) => {
                    info!("credential refreshed; reconnecting");
                    transport.inner.link().attempts = 0;
                    transport.connect().await;
                }
                Err(e) => transport.fail_auth(e.to_string()),
            }
        });
    }

    fn fail_auth(&self, reason: String) {
        warn!(reason = %reason, "giving up on the session");
        self.inner.auth.clear_session();
        self.disconnect(true);
        self.inner.link().auth_failed = true;
        self.inner.bus.emit(&RealtimeEvent::AuthFailure { reason });
    }

    fn schedule_reconnect(&self) {
        let scheduled = {
            let mut link = self.inner.link();
            self.inner
                .config
                .reconnect
                .next_attempt(link.attempts)
                .map(|(attempt, delay)| {
                    link.attempts = attempt;
                    if let Some(old) = link.reconnect.take() {
                        old.cancel();
                    }
                    let token = link.root.child_token();
                    link.reconnect = Some(token.clone());
                    (attempt, delay, token)
                })
        };

        let Some((attempt, delay, token)) = scheduled else {
            warn!(
                max_attempts = self.inner.config.reconnect.max_attempts,
                "reconnect attempts exhausted; staying on polling"
            );
            return;
        };

        info!(attempt, delay_ms = delay.as_millis(), "scheduling reconnect");
        let transport = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => transport.connect().await,
            }
        });
    }

    // ── Polling fallback ─────────────────────────────────────────────

    fn start_polling(&self) {
        let token = {
            let mut link = self.inner.link();
            if link.poller.is_some() {
                return;
            }
            let token = link.root.child_token();
            link.poller = Some(token.clone());
            token
        };

        let period = self.inner.config.poll_interval;
        info!(interval_secs = period.as_secs(), "starting polling fallback");
        let transport = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = interval.tick() => transport.poll_once().await,
                }
            }
            debug!("polling stopped");
        });
    }

    /// Fetch the newest pending orders once, publish the ones placed
    /// since the previous poll, then publish the total.
    ///
    /// On failure the last known count is re-published.
    pub async fn poll_once(&self) {
        let limit = self.inner.config.poll_limit;
        match self.inner.orders.recent_pending(limit).await {
            Ok(page) => {
                let fresh = self.inner.link().cursor.advance(&page.orders);
                let now = Utc::now();
                if !fresh.is_empty() {
                    debug!(count = fresh.len(), "poll found new orders");
                }
                for record in &fresh {
                    let order = PendingOrderEvent::from_record(record, now);
                    self.inner.bus.emit(&RealtimeEvent::OrderCreated(order));
                }
                let total = page.pagination.total_orders;
                self.inner.pending.store(total);
                self.inner.bus.emit(&RealtimeEvent::PendingCount(total));
            }
            Err(e) => {
                warn!(error = %e, "poll failed; keeping last known state");
                if let Some(count) = self.inner.pending.current() {
                    self.inner.bus.emit(&RealtimeEvent::PendingCount(count));
                }
            }
        }
    }

    // ── Health check ─────────────────────────────────────────────────

    async fn health_task(self, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.inner.config.health_check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = interval.tick() => {
                    if self.needs_healing() {
                        warn!("order channel idle with no fallback; reconnecting");
                        self.force_reconnect().await;
                    }
                }
            }
        }
        debug!("health check stopped");
    }

    /// Down, not polling, nothing scheduled, and not parked on a failed
    /// session.
    fn needs_healing(&self) -> bool {
        let link = self.inner.link();
        self.state() != ConnectionState::Connected
            && !link.connecting
            && !link.auth_failed
            && link.poller.is_none()
            && link.reconnect.is_none()
    }

    // ── State ────────────────────────────────────────────────────────

    fn set_state(&self, next: ConnectionState) {
        let changed = self.inner.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!(state = %next, "connection state changed");
            self.inner
                .bus
                .emit(&RealtimeEvent::ConnectionStateChanged(next));
        }
    }
}

/// Reopen the channel when the first subscriber arrives on a started,
/// idle transport.
fn on_first_subscriber(weak: &Weak<TransportInner>) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    let transport = RealtimeTransport { inner };
    if transport.state() != ConnectionState::Disconnected {
        return;
    }
    {
        let link = transport.inner.link();
        if !link.started || link.auth_failed || link.connecting {
            return;
        }
    }
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            debug!("first subscriber on idle channel; connecting");
            handle.spawn(transport.connect());
        }
        Err(_) => debug!("first subscriber outside a runtime; not connecting"),
    }
}
