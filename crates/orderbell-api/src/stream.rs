//! Server-sent order stream.
//!
//! Opens `GET {api}/realtime/orders?token=<bearer>` and yields parsed
//! [`StreamEnvelope`]s. The bearer token rides in the query string because
//! event-stream endpoints are consumed by clients that cannot set headers.
//!
//! [`StreamClient::open`] resolves once the response headers arrive with a
//! success status, which is the stream's "open" moment. Reconnection is not
//! handled here; `orderbell-core` owns that policy.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures_util::StreamExt;
//! use orderbell_api::{StreamClient, TransportConfig};
//!
//! let client = StreamClient::new(api_url, &TransportConfig::default())?;
//! let mut stream = client.open(Some(&token)).await?;
//! while let Some(message) = stream.next().await {
//!     println!("{}", message?.kind);
//! }
//! ```

use std::pin::Pin;

use futures_util::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, trace};
use url::Url;

use crate::error::Error;
use crate::models::StreamEnvelope;
use crate::sse::SseDecoder;
use crate::transport::{TransportConfig, endpoint};

/// Boxed stream of envelopes. Ends when the server closes the response.
pub type EnvelopeStream = Pin<Box<dyn Stream<Item = Result<StreamEnvelope, Error>> + Send>>;

const STREAM_PATH: &str = "realtime/orders";

/// HTTP client for the order event stream.
#[derive(Clone)]
pub struct StreamClient {
    http: reqwest::Client,
    base_url: Url,
}

impl StreamClient {
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_streaming_client()?,
            base_url,
        })
    }

    /// Create a stream client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The stream URL, with the bearer token in the query string.
    pub fn stream_url(&self, token: Option<&SecretString>) -> Result<Url, Error> {
        let mut url = endpoint(&self.base_url, STREAM_PATH)?;
        if let Some(token) = token {
            url.query_pairs_mut()
                .append_pair("token", token.expose_secret());
        }
        Ok(url)
    }

    /// Open the stream.
    ///
    /// Fails with [`Error::StreamRefused`] when the server answers with a
    /// non-success status (expired token, missing permission, etc.).
    pub async fn open(&self, token: Option<&SecretString>) -> Result<EnvelopeStream, Error> {
        let url = self.stream_url(token)?;
        info!(path = url.path(), "opening order stream");

        let resp = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            debug!(%status, "order stream refused");
            return Err(Error::StreamRefused {
                status: status.as_u16(),
            });
        }

        info!("order stream open");
        Ok(envelopes(resp))
    }
}

/// Turn a streaming response body into parsed envelopes.
fn envelopes(resp: reqwest::Response) -> EnvelopeStream {
    let mut body = resp.bytes_stream();

    Box::pin(async_stream::stream! {
        let mut decoder = SseDecoder::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for frame in decoder.push(&bytes) {
                        if let Some(envelope) = parse_envelope(&frame.data) {
                            yield Ok(envelope);
                        }
                    }
                }
                Err(e) => {
                    yield Err(Error::Transport(e));
                    break;
                }
            }
        }
        debug!("order stream body ended");
    })
}

/// Parse one frame's data as an envelope. Malformed frames are dropped.
pub fn parse_envelope(data: &str) -> Option<StreamEnvelope> {
    match serde_json::from_str::<StreamEnvelope>(data) {
        Ok(envelope) => {
            trace!(kind = %envelope.kind, "stream message");
            Some(envelope)
        }
        Err(e) => {
            debug!(error = %e, "failed to parse stream message");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_carries_token() {
        let client = StreamClient::with_client(
            reqwest::Client::new(),
            Url::parse("https://shop.example/api").unwrap(),
        );
        let token = SecretString::from("abc.def.ghi".to_string());
        let url = client.stream_url(Some(&token)).unwrap();
        assert_eq!(url.path(), "/api/realtime/orders");
        assert_eq!(url.query(), Some("token=abc.def.ghi"));
    }

    #[test]
    fn stream_url_without_token_has_no_query() {
        let client = StreamClient::with_client(
            reqwest::Client::new(),
            Url::parse("https://shop.example/api/").unwrap(),
        );
        assert!(client.stream_url(None).unwrap().query().is_none());
    }

    #[test]
    fn parse_envelope_accepts_known_and_unknown_types() {
        let env = parse_envelope(r#"{"type":"order.created","data":{"_id":"1"}}"#).unwrap();
        assert_eq!(env.kind, "order.created");

        let unknown = parse_envelope(r#"{"type":"menu.changed"}"#).unwrap();
        assert_eq!(unknown.kind, "menu.changed");
    }

    #[test]
    fn parse_envelope_drops_malformed() {
        assert!(parse_envelope("not json").is_none());
        assert!(parse_envelope(r#"{"no_type":true}"#).is_none());
    }
}
