// ── Core error types ──
//
// User-facing errors from orderbell-core. Consumers never see raw HTTP
// statuses or JSON parse failures; the `From<orderbell_api::Error>` impl
// translates transport-layer errors into domain variants.

use thiserror::Error;

use crate::model::EventKind;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach order service at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Not logged in -- run `orderbell login` first")]
    NotLoggedIn,

    #[error("Order service timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Subscription errors ──────────────────────────────────────────
    #[error("Event type '{kind}' is not forwarded to page subscribers")]
    UnsupportedEvent { kind: EventKind },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<orderbell_api::Error> for CoreError {
    fn from(err: orderbell_api::Error) -> Self {
        match err {
            orderbell_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            orderbell_api::Error::SessionExpired => CoreError::AuthenticationFailed {
                message: "Session expired -- log in again".into(),
            },
            orderbell_api::Error::MissingCredential => CoreError::NotLoggedIn,
            orderbell_api::Error::InvalidToken(reason) => CoreError::AuthenticationFailed {
                message: format!("Stored token is unusable: {reason}"),
            },
            orderbell_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            orderbell_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            orderbell_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            orderbell_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            orderbell_api::Error::StreamRefused { status } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("order stream refused (HTTP {status})"),
            },
            orderbell_api::Error::StreamClosed => CoreError::ConnectionFailed {
                url: String::new(),
                reason: "order stream closed by server".into(),
            },
            orderbell_api::Error::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            orderbell_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            orderbell_api::Error::TokenStore(msg) => CoreError::Config {
                message: format!("Token store: {msg}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_becomes_not_logged_in() {
        let err: CoreError = orderbell_api::Error::MissingCredential.into();
        assert!(matches!(err, CoreError::NotLoggedIn));
    }

    #[test]
    fn api_status_is_preserved() {
        let err: CoreError = orderbell_api::Error::Api {
            status: 503,
            message: "down".into(),
        }
        .into();
        assert!(matches!(err, CoreError::Api { status: Some(503), .. }));
    }
}
