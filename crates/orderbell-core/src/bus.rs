// ── Event bus ──
//
// Keyed publish/subscribe with synchronous delivery. Callbacks run on the
// emitting task, outside the registry lock, so they may subscribe or
// unsubscribe re-entrantly. A panicking callback is logged and isolated.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use indexmap::IndexMap;
use tracing::{debug, error};

use crate::model::{EventKind, RealtimeEvent};

/// A subscriber callback.
///
/// Registrations are compared by `Arc` identity: subscribing the same
/// `Callback` twice to one kind registers it once.
pub type Callback = Arc<dyn Fn(&RealtimeEvent) + Send + Sync>;

/// Wrap a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&RealtimeEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

type ActivationHook = Arc<dyn Fn() + Send + Sync>;

struct Registration {
    id: u64,
    callback: Callback,
}

#[derive(Default)]
struct BusInner {
    registry: Mutex<IndexMap<EventKind, Vec<Registration>>>,
    next_id: AtomicU64,
    activation: Mutex<Option<ActivationHook>>,
}

impl BusInner {
    fn registry(&self) -> MutexGuard<'_, IndexMap<EventKind, Vec<Registration>>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, kind: EventKind, id: u64) -> bool {
        let mut registry = self.registry();
        let Some(bucket) = registry.get_mut(&kind) else {
            return false;
        };
        let before = bucket.len();
        bucket.retain(|r| r.id != id);
        let removed = bucket.len() != before;
        if bucket.is_empty() {
            registry.shift_remove(&kind);
        }
        removed
    }

    fn is_registered(&self, kind: EventKind, id: u64) -> bool {
        self.registry()
            .get(&kind)
            .is_some_and(|bucket| bucket.iter().any(|r| r.id == id))
    }
}

/// Keyed event bus. Cheap to clone; clones share registrations.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` whenever the bus goes from no subscribers to one.
    pub fn set_activation_hook<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self
            .inner
            .activation
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    /// Register `callback` for `kind`.
    pub fn subscribe(&self, kind: EventKind, callback: Callback) -> Subscription {
        let (id, activated) = {
            let mut registry = self.inner.registry();
            let activated = registry.is_empty();
            let bucket = registry.entry(kind).or_default();
            if let Some(existing) = bucket.iter().find(|r| Arc::ptr_eq(&r.callback, &callback)) {
                (existing.id, false)
            } else {
                let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                bucket.push(Registration { id, callback });
                (id, activated)
            }
        };
        debug!(event = %kind, id, "subscribed");

        if activated {
            let hook = self
                .inner
                .activation
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(hook) = hook {
                hook();
            }
        }

        Subscription {
            bus: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Remove `callback` from `kind`. Returns whether it was registered.
    pub fn unsubscribe(&self, kind: EventKind, callback: &Callback) -> bool {
        let id = self.inner.registry().get(&kind).and_then(|bucket| {
            bucket
                .iter()
                .find(|r| Arc::ptr_eq(&r.callback, callback))
                .map(|r| r.id)
        });
        id.is_some_and(|id| self.inner.remove(kind, id))
    }

    /// Deliver `event` to every callback registered for its kind.
    ///
    /// Delivery walks a snapshot taken before the first call. A callback
    /// removed by an earlier callback in the same emit is skipped; one
    /// added during the emit first hears the next event. Returns the
    /// number of callbacks that ran to completion.
    pub fn emit(&self, event: &RealtimeEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<(u64, Callback)> = self
            .inner
            .registry()
            .get(&kind)
            .map(|bucket| {
                bucket
                    .iter()
                    .map(|r| (r.id, Arc::clone(&r.callback)))
                    .collect()
            })
            .unwrap_or_default();

        let mut delivered = 0;
        for (id, callback) in snapshot {
            if !self.inner.is_registered(kind, id) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    error!(
                        event = %kind,
                        id,
                        panic = panic_message(panic.as_ref()),
                        "subscriber panicked; continuing delivery"
                    );
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner.registry().get(&kind).map_or(0, Vec::len)
    }

    pub fn has_subscribers(&self) -> bool {
        !self.inner.registry().is_empty()
    }

    /// Registered callbacks per kind, in first-subscribed order.
    pub fn counts(&self) -> IndexMap<EventKind, usize> {
        self.inner
            .registry()
            .iter()
            .map(|(kind, bucket)| (*kind, bucket.len()))
            .collect()
    }
}

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping the handle does not unsubscribe; call
/// [`unsubscribe`](Self::unsubscribe), which is idempotent.
#[must_use = "keep the Subscription to be able to unsubscribe"]
#[derive(Debug, Clone)]
pub struct Subscription {
    bus: Weak<BusInner>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn unsubscribe(&self) {
        if let Some(inner) = self.bus.upgrade() {
            if inner.remove(self.kind, self.id) {
                debug!(event = %self.kind, id = self.id, "unsubscribed");
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|inner| inner.is_registered(self.kind, self.id))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}
