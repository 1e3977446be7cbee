// orderbell-api: Async Rust client for the restaurant order API (REST + SSE)

pub mod auth;
pub mod error;
pub mod models;
pub mod orders;
pub mod sse;
pub mod stream;
pub mod transport;

pub use auth::{
    AuthClient, Claims, Credential, Expiry, MemoryTokenStore, Session, TokenKey, TokenStore,
};
pub use error::Error;
pub use models::{OrderQuery, OrderRecord, OrdersPage, Pagination, StreamEnvelope};
pub use orders::OrdersClient;
pub use stream::{EnvelopeStream, StreamClient};
pub use transport::{TlsMode, TransportConfig};
