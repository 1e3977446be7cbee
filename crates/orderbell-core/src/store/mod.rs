// ── Client-side state ──
//
// Small pieces of state the transport keeps between events: the cached
// pending-order count and the polling cursor.

pub mod cursor;
pub mod pending;

pub use cursor::PollCursor;
pub use pending::PendingCountCache;
