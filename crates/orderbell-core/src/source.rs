// ── Collaborator seams ──
//
// The transport and the pending-count cache talk to the outside world
// through these traits. Production wiring uses the orderbell-api clients;
// tests swap in in-memory fakes.

use async_trait::async_trait;
use orderbell_api::{Credential, EnvelopeStream, OrdersClient, OrdersPage, Session, StreamClient};
use tracing::warn;

/// Read access to pending orders.
#[async_trait]
pub trait OrderSource: Send + Sync {
    /// Authoritative number of pending orders.
    async fn pending_count(&self) -> Result<u64, orderbell_api::Error>;

    /// The newest `limit` pending orders, newest first, plus pagination.
    async fn recent_pending(&self, limit: u32) -> Result<OrdersPage, orderbell_api::Error>;
}

/// Opens the server-push order stream.
#[async_trait]
pub trait EventStreamConnector: Send + Sync {
    async fn open(
        &self,
        credential: Option<&Credential>,
    ) -> Result<EnvelopeStream, orderbell_api::Error>;
}

/// The session as seen by the transport.
#[async_trait]
pub trait SessionAuth: Send + Sync {
    /// The credential currently held, if any.
    fn credential(&self) -> Option<Credential>;

    /// Exchange the refresh token for a new credential.
    async fn refresh(&self) -> Result<Credential, orderbell_api::Error>;

    /// Forget every stored token.
    fn clear_session(&self);
}

// ── Production implementations ───────────────────────────────────────

#[async_trait]
impl OrderSource for OrdersClient {
    async fn pending_count(&self) -> Result<u64, orderbell_api::Error> {
        OrdersClient::pending_count(self).await
    }

    async fn recent_pending(&self, limit: u32) -> Result<OrdersPage, orderbell_api::Error> {
        self.pending_orders(limit).await
    }
}

#[async_trait]
impl EventStreamConnector for StreamClient {
    async fn open(
        &self,
        credential: Option<&Credential>,
    ) -> Result<EnvelopeStream, orderbell_api::Error> {
        StreamClient::open(self, credential.map(Credential::token)).await
    }
}

#[async_trait]
impl SessionAuth for Session {
    fn credential(&self) -> Option<Credential> {
        Session::credential(self)
    }

    async fn refresh(&self) -> Result<Credential, orderbell_api::Error> {
        Session::refresh(self).await
    }

    fn clear_session(&self) {
        if let Err(e) = self.clear() {
            warn!(error = %e, "failed to clear stored tokens");
        }
    }
}
