// ── Runtime connection configuration ──
//
// These types describe *how* to reach the order service and how the
// real-time layer behaves. They never touch disk: the CLI builds a
// `RealtimeConfig` from its profile and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use orderbell_api::{TlsMode, TransportConfig};
use url::Url;

use crate::reconnect::ReconnectPolicy;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (local development servers).
    DangerAcceptInvalid,
}

/// Configuration for the real-time notification layer.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// API base URL, e.g. `https://shop.example.com/api`.
    pub api_url: Url,
    pub tls: TlsVerification,
    /// Whole-request timeout for REST calls.
    pub timeout: Duration,
    /// How long the stream handshake may take before it counts as failed.
    pub handshake_timeout: Duration,
    /// Interval of the polling fallback.
    pub poll_interval: Duration,
    /// Number of recent pending orders fetched per poll.
    pub poll_limit: u32,
    /// Interval of the self-healing health check.
    pub health_check_interval: Duration,
    pub reconnect: ReconnectPolicy,
    /// How long a fetched pending count stays fresh.
    pub pending_ttl: Duration,
    /// Quiet period that collapses bursts of refresh requests.
    pub pending_debounce: Duration,
    /// Keep the channel open while anyone is subscribed, ignoring
    /// non-forced disconnect requests.
    pub persistent: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse("http://localhost:5000/api").expect("static URL is valid"),
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(30),
            poll_limit: 10,
            health_check_interval: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
            pending_ttl: Duration::from_secs(60),
            pending_debounce: Duration::from_secs(2),
            persistent: true,
        }
    }
}

impl RealtimeConfig {
    /// HTTP settings shared by the REST and stream clients.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            tls: tls_to_transport(&self.tls),
            timeout: self.timeout,
            ..TransportConfig::default()
        }
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_contract() {
        let config = RealtimeConfig::default();
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.poll_limit, 10);
        assert_eq!(config.pending_ttl, Duration::from_secs(60));
        assert_eq!(config.pending_debounce, Duration::from_secs(2));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert!(config.persistent);
    }

    #[test]
    fn transport_config_carries_tls_and_timeout() {
        let config = RealtimeConfig {
            tls: TlsVerification::DangerAcceptInvalid,
            timeout: Duration::from_secs(7),
            ..RealtimeConfig::default()
        };
        let transport = config.transport_config();
        assert!(matches!(transport.tls, TlsMode::DangerAcceptInvalid));
        assert_eq!(transport.timeout, Duration::from_secs(7));
    }
}
