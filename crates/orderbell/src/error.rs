//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use orderbell_config::ConfigError;
use orderbell_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the order service at {url}: {reason}")]
    #[diagnostic(
        code(orderbell::connection_failed),
        help(
            "Check that the storefront API is running and reachable.\n\
             URL: {url}\n\
             Try: orderbell status --insecure"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(orderbell::auth_failed),
        help("Log in again with: orderbell login")
    )]
    AuthFailed { message: String },

    #[error("Not logged in for profile '{profile}'")]
    #[diagnostic(
        code(orderbell::not_logged_in),
        help(
            "Log in with: orderbell login --profile {profile}\n\
             Or pass a bearer token with --token / ORDERBELL_TOKEN."
        )
    )]
    NotLoggedIn { profile: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error ({code}): {message}")]
    #[diagnostic(code(orderbell::api_error))]
    ApiError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(orderbell::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(orderbell::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: orderbell config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No storefront configured")]
    #[diagnostic(
        code(orderbell::no_config),
        help(
            "Create a profile with: orderbell config init\n\
             Or pass --api-url / ORDERBELL_API_URL.\n\
             Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(orderbell::config))]
    Config { message: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(orderbell::timeout),
        help("Increase timeout with --timeout or check the API's responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NotLoggedIn { .. } => exit_code::AUTH,
            Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::NotLoggedIn => CliError::NotLoggedIn {
                profile: "current".into(),
            },

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::UnsupportedEvent { kind } => CliError::Validation {
                field: "event".into(),
                reason: format!("'{kind}' cannot be watched"),
            },

            CoreError::Api { message, status } => CliError::ApiError {
                code: status.map_or_else(|| "api".into(), |s| s.to_string()),
                message,
            },

            CoreError::Config { message } => CliError::Config { message },

            CoreError::Internal(message) => CliError::ApiError {
                code: "internal".into(),
                message,
            },
        }
    }
}

impl From<orderbell_api::Error> for CliError {
    fn from(err: orderbell_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::ProfileNotFound { name, available } => CliError::ProfileNotFound {
                name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available
                },
            },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_exit_with_auth_code() {
        let err = CliError::from(CoreError::NotLoggedIn);
        assert_eq!(err.exit_code(), exit_code::AUTH);

        let err = CliError::from(orderbell_api::Error::SessionExpired);
        assert!(matches!(err, CliError::AuthFailed { .. }));
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }

    #[test]
    fn api_status_becomes_error_code() {
        let err = CliError::from(CoreError::Api {
            message: "boom".into(),
            status: Some(500),
        });
        assert!(matches!(err, CliError::ApiError { ref code, .. } if code == "500"));
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }

    #[test]
    fn missing_profile_lists_none() {
        let err = CliError::from(ConfigError::ProfileNotFound {
            name: "shop".into(),
            available: String::new(),
        });
        assert!(matches!(err, CliError::ProfileNotFound { ref available, .. } if available == "(none)"));
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);
    }
}
