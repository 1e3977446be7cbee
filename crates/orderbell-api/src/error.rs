use thiserror::Error;

/// Top-level error type for the `orderbell-api` crate.
///
/// Covers every failure mode across the API surfaces: authentication,
/// transport, the order stream, the REST envelope, and token storage.
/// `orderbell-core` maps these into state changes and events.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login or refresh rejected (wrong credentials, revoked token, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The bearer token has expired and no refresh is possible.
    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    /// No bearer token is stored.
    #[error("No credential available -- log in first")]
    MissingCredential,

    /// The bearer token could not be decoded.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Order stream ────────────────────────────────────────────────
    /// The server answered the stream request with a non-success status.
    #[error("Order stream refused (HTTP {status})")]
    StreamRefused { status: u16 },

    /// The server ended the stream.
    #[error("Order stream closed by server")]
    StreamClosed,

    // ── REST API ────────────────────────────────────────────────────
    /// Error reported by the API, either via HTTP status or the
    /// `{ success: false, message }` envelope.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── Storage ─────────────────────────────────────────────────────
    /// Reading or writing the token store failed.
    #[error("Token store error: {0}")]
    TokenStore(String),
}

impl Error {
    /// Returns `true` when the server turned the stream down outright,
    /// before any event was delivered.
    pub fn is_immediate_close(&self) -> bool {
        matches!(self, Self::StreamRefused { .. } | Self::StreamClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_or_closed_stream_is_immediate_close() {
        assert!(Error::StreamRefused { status: 401 }.is_immediate_close());
        assert!(Error::StreamClosed.is_immediate_close());
    }

    #[test]
    fn timeouts_and_api_errors_are_not_immediate_close() {
        assert!(!Error::Timeout { timeout_secs: 5 }.is_immediate_close());
        let err = Error::Api {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(!err.is_immediate_close());
    }
}
