// ── Domain model ──

pub mod event;

pub use event::{
    ConnectionState, EnvelopeError, EventKind, OrderUpdate, PendingOrderEvent, RealtimeEvent,
};
