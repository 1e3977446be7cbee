// orderbell-core: Real-time order notifications between orderbell-api and consumers.

pub mod bus;
pub mod config;
pub mod error;
pub mod model;
pub mod reconnect;
pub mod service;
pub mod source;
pub mod store;
pub mod transport;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bus::{Callback, EventBus, Subscription, callback};
pub use config::{RealtimeConfig, TlsVerification};
pub use error::CoreError;
pub use model::{
    ConnectionState, EnvelopeError, EventKind, OrderUpdate, PendingOrderEvent, RealtimeEvent,
};
pub use reconnect::{FailureKind, ReconnectPolicy, classify_failure};
pub use service::{FORWARDED_KINDS, RealtimeService, ServiceStats};
pub use source::{EventStreamConnector, OrderSource, SessionAuth};
pub use store::{PendingCountCache, PollCursor};
pub use transport::RealtimeTransport;
