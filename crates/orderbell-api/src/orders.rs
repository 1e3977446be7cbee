// Orders API HTTP client
//
// Wraps `reqwest::Client` with bearer-token injection and envelope
// unwrapping for `GET /orders`. The bearer token is read from the session
// on every call so a refreshed token is used without rebuilding the client.

use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::auth::{Session, preview};
use crate::error::Error;
use crate::models::{ApiEnvelope, OrderQuery, OrdersPage};
use crate::transport::{TransportConfig, endpoint};

/// Raw HTTP client for the orders endpoints.
#[derive(Clone)]
pub struct OrdersClient {
    http: reqwest::Client,
    base_url: Url,
    session: Session,
}

impl OrdersClient {
    pub fn new(base_url: Url, session: Session, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            base_url,
            session,
        })
    }

    /// Create an orders client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, session: Session) -> Self {
        Self {
            http,
            base_url,
            session,
        }
    }

    /// `GET /orders` with arbitrary query parameters.
    ///
    /// Fails with [`Error::MissingCredential`] before any request when no
    /// bearer token is stored.
    pub async fn list_orders(&self, query: &OrderQuery) -> Result<OrdersPage, Error> {
        let credential = self.session.credential().ok_or(Error::MissingCredential)?;
        let url = endpoint(&self.base_url, "orders")?;
        debug!(limit = query.limit, status = ?query.status, "GET {}", url);

        let resp = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(credential.token().expose_secret())
            .send()
            .await?;

        Ok(parse_envelope::<OrdersPage>(resp).await?.unwrap_or_default())
    }

    /// The newest pending orders, newest first.
    pub async fn pending_orders(&self, limit: u32) -> Result<OrdersPage, Error> {
        self.list_orders(&OrderQuery::pending(limit)).await
    }

    /// Authoritative count of pending orders.
    ///
    /// Asks for a single record and reads the total from the pagination
    /// block, so the payload stays small however many orders are waiting.
    pub async fn pending_count(&self) -> Result<u64, Error> {
        Ok(self.pending_orders(1).await?.pagination.total_orders)
    }
}

/// Unwrap `{ success, data, message }`, mapping HTTP and envelope errors.
async fn parse_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<Option<T>, Error> {
    let status = resp.status();

    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::Authentication {
            message: "bearer token rejected".into(),
        });
    }

    let body = resp.text().await?;

    if !status.is_success() {
        return Err(Error::Api {
            status: status.as_u16(),
            message: preview(&body),
        });
    }

    let envelope: ApiEnvelope<T> =
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&body)),
            body: body.clone(),
        })?;

    if envelope.success {
        Ok(envelope.data)
    } else {
        Err(Error::Api {
            status: status.as_u16(),
            message: envelope
                .message
                .unwrap_or_else(|| "request unsuccessful".into()),
        })
    }
}
