// ── Pending-count cache ──
//
// Caches the number of pending orders with a freshness window, collapses
// concurrent fetches into one request, and debounces bursts of refresh
// requests into a single fetch-and-publish.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::model::RealtimeEvent;
use crate::source::OrderSource;

type SharedFetch = Shared<BoxFuture<'static, u64>>;

#[derive(Debug, Clone, Copy)]
struct CachedCount {
    value: u64,
    captured_at: Instant,
}

#[derive(Default)]
enum FetchPhase {
    #[default]
    Idle,
    InFlight(SharedFetch),
}

/// Where the debounced refresh stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum RefreshPhase {
    #[default]
    Idle,
    /// A timer is pending; only the one holding `generation` may run.
    Debounced { generation: u64 },
    Running,
}

#[derive(Default)]
struct CacheState {
    cached: Option<CachedCount>,
    fetch: FetchPhase,
    refresh: RefreshPhase,
    generation: u64,
}

impl CacheState {
    fn fresh_value(&self, now: Instant, ttl: Duration) -> Option<u64> {
        self.cached
            .filter(|c| now.saturating_duration_since(c.captured_at) < ttl)
            .map(|c| c.value)
    }

    /// Arm a new debounce timer, superseding any pending one. Returns the
    /// timer's generation, or `None` while a refresh is already running.
    fn arm_refresh(&mut self) -> Option<u64> {
        if self.refresh == RefreshPhase::Running {
            return None;
        }
        self.generation += 1;
        self.refresh = RefreshPhase::Debounced {
            generation: self.generation,
        };
        Some(self.generation)
    }

    /// Claim the refresh for the timer holding `generation`.
    fn begin_refresh(&mut self, generation: u64) -> bool {
        if self.refresh == (RefreshPhase::Debounced { generation }) {
            self.refresh = RefreshPhase::Running;
            true
        } else {
            false
        }
    }
}

struct CacheInner {
    source: Arc<dyn OrderSource>,
    bus: EventBus,
    ttl: Duration,
    debounce: Duration,
    state: Mutex<CacheState>,
}

impl CacheInner {
    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cached, single-flight, debounced pending-order count.
///
/// Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct PendingCountCache {
    inner: Arc<CacheInner>,
}

impl PendingCountCache {
    pub fn new(
        source: Arc<dyn OrderSource>,
        bus: EventBus,
        ttl: Duration,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                source,
                bus,
                ttl,
                debounce,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// The pending count, from cache when fresh.
    ///
    /// With `force`, or once the cached value is older than the TTL, the
    /// count is fetched. Concurrent callers share one in-flight fetch. A
    /// failed fetch yields the last cached value, or 0.
    pub async fn get(&self, force: bool) -> u64 {
        let fetch = {
            let mut state = self.inner.state();
            if !force {
                if let Some(value) = state.fresh_value(Instant::now(), self.inner.ttl) {
                    return value;
                }
            }
            match &state.fetch {
                FetchPhase::InFlight(shared) => shared.clone(),
                FetchPhase::Idle => {
                    let shared = self.start_fetch();
                    state.fetch = FetchPhase::InFlight(shared.clone());
                    shared
                }
            }
        };
        fetch.await
    }

    fn start_fetch(&self) -> SharedFetch {
        let inner = Arc::clone(&self.inner);
        async move {
            let result = inner.source.pending_count().await;
            let mut state = inner.state();
            state.fetch = FetchPhase::Idle;
            match result {
                Ok(value) => {
                    debug!(count = value, "pending count fetched");
                    state.cached = Some(CachedCount {
                        value,
                        captured_at: Instant::now(),
                    });
                    value
                }
                Err(e) => {
                    let fallback = state.cached.map_or(0, |c| c.value);
                    warn!(error = %e, fallback, "pending count fetch failed; using last known value");
                    fallback
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Request a fetch-and-publish of the count.
    ///
    /// Calls within the debounce window collapse into one; the latest call
    /// wins. `force` skips the window and bypasses the cache. Requests made
    /// while a refresh is running are dropped.
    pub fn refresh(&self, force: bool) {
        let Some(generation) = self.inner.state().arm_refresh() else {
            debug!("pending count refresh already running; request dropped");
            return;
        };
        let delay = if force {
            Duration::ZERO
        } else {
            self.inner.debounce
        };

        let cache = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !cache.inner.state().begin_refresh(generation) {
                return;
            }
            let count = cache.get(force).await;
            cache.inner.state().refresh = RefreshPhase::Idle;
            cache.inner.bus.emit(&RealtimeEvent::PendingCount(count));
        });
    }

    /// Overwrite the cache with a count the server pushed.
    pub fn store(&self, value: u64) {
        self.inner.state().cached = Some(CachedCount {
            value,
            captured_at: Instant::now(),
        });
    }

    /// Last known count, fresh or not.
    pub fn current(&self) -> Option<u64> {
        self.inner.state().cached.map(|c| c.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use orderbell_api::OrdersPage;

    use crate::bus::callback;
    use crate::model::EventKind;

    /// Counts calls and answers with the next value after a short delay.
    struct FakeSource {
        calls: AtomicUsize,
        next: AtomicU64,
        fail: bool,
    }

    impl FakeSource {
        fn new(start: u64) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                next: AtomicU64::new(start),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                next: AtomicU64::new(0),
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OrderSource for FakeSource {
        async fn pending_count(&self) -> Result<u64, orderbell_api::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail {
                return Err(orderbell_api::Error::Timeout { timeout_secs: 30 });
            }
            Ok(self.next.fetch_add(1, Ordering::SeqCst))
        }

        async fn recent_pending(&self, _limit: u32) -> Result<OrdersPage, orderbell_api::Error> {
            Ok(OrdersPage::default())
        }
    }

    fn cache(source: &Arc<FakeSource>, bus: &EventBus) -> PendingCountCache {
        PendingCountCache::new(
            Arc::clone(source) as Arc<dyn OrderSource>,
            bus.clone(),
            Duration::from_secs(60),
            Duration::from_secs(2),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_gets_share_one_fetch() {
        let source = FakeSource::new(7);
        let cache = cache(&source, &EventBus::new());

        let (a, b, c) = tokio::join!(cache.get(false), cache.get(false), cache.get(true));

        assert_eq!((a, b, c), (7, 7, 7));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_value_is_served_from_cache() {
        let source = FakeSource::new(3);
        let cache = cache(&source, &EventBus::new());

        assert_eq!(cache.get(false).await, 3);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(cache.get(false).await, 3);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_value_or_force_refetches() {
        let source = FakeSource::new(3);
        let cache = cache(&source, &EventBus::new());

        assert_eq!(cache.get(false).await, 3);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get(false).await, 4);
        assert_eq!(cache.get(true).await, 5);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_returns_last_known_value() {
        let source = FakeSource::failing();
        let cache = cache(&source, &EventBus::new());

        assert_eq!(cache.get(false).await, 0);
        cache.store(9);
        assert_eq!(cache.get(true).await, 9);
        assert_eq!(cache.current(), Some(9));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_refreshes_publishes_once() {
        let source = FakeSource::new(4);
        let bus = EventBus::new();
        let cache = cache(&source, &bus);

        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&published);
        let _sub = bus.subscribe(
            EventKind::PendingCount,
            callback(move |event| {
                if let RealtimeEvent::PendingCount(n) = event {
                    sink.lock().unwrap_or_else(PoisonError::into_inner).push(*n);
                }
            }),
        );

        cache.refresh(false);
        tokio::time::sleep(Duration::from_millis(500)).await;
        cache.refresh(false);
        cache.refresh(false);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(source.calls(), 1);
        assert_eq!(
            *published.lock().unwrap_or_else(PoisonError::into_inner),
            vec![4]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn forced_refresh_skips_debounce_window() {
        let source = FakeSource::new(1);
        let bus = EventBus::new();
        let cache = cache(&source, &bus);
        cache.store(10);

        cache.refresh(true);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(source.calls(), 1);
        assert_eq!(cache.current(), Some(1));
    }

    #[test]
    fn newer_timer_supersedes_older_one() {
        let mut state = CacheState::default();
        let first = state.arm_refresh().expect("armed");
        let second = state.arm_refresh().expect("armed");

        assert!(!state.begin_refresh(first));
        assert!(state.begin_refresh(second));
        assert_eq!(state.arm_refresh(), None);
    }
}
