//! Shared configuration for orderbell tools.
//!
//! TOML profiles merged with `ORDERBELL_` environment overrides, the
//! keyring-backed token store, and translation to
//! `orderbell_core::RealtimeConfig`. The CLI layers its flag overrides on
//! top of what this crate resolves.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use orderbell_api::{MemoryTokenStore, TokenKey, TokenStore};
use orderbell_core::{RealtimeConfig, TlsVerification};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Service name under which tokens are kept in the system keyring.
pub const KEYRING_SERVICE: &str = "orderbell";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found (available: {available})")]
    ProfileNotFound { name: String, available: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named explicitly.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named storefront profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile by name.
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.into(),
                available: self.profile_names().join(", "),
            })
    }

    /// Profile names, sorted.
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named storefront profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Profile {
    /// API base URL (e.g., "https://shop.example.com/api").
    pub api_url: String,

    /// Staff account used by `login`.
    pub email: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override request timeout, in seconds.
    pub timeout: Option<u64>,

    /// Polling fallback interval, in seconds.
    pub poll_interval: Option<u64>,

    /// Orders fetched per poll.
    pub poll_limit: Option<u32>,

    /// Freshness window of the pending count, in seconds.
    pub pending_ttl: Option<u64>,

    /// Keep the stream open while anything is subscribed.
    pub persistent: Option<bool>,
}

impl Profile {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "orderbell", "orderbell").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("orderbell");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment.
///
/// Nested keys use a double underscore: `ORDERBELL_DEFAULTS__TIMEOUT=10`.
/// A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ORDERBELL_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_else(|e| {
        debug!(error = %e, "config unreadable; using defaults");
        Config::default()
    })
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation to core ─────────────────────────────────────────────

/// Parse an API base URL, naming the offending value on failure.
pub fn parse_api_url(raw: &str) -> Result<url::Url, ConfigError> {
    let url: url::Url = raw.parse().map_err(|_| ConfigError::Validation {
        field: "api_url".into(),
        reason: format!("invalid URL: {raw}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation {
            field: "api_url".into(),
            reason: format!("expected http or https, got '{}'", url.scheme()),
        });
    }
    Ok(url)
}

/// Build a `RealtimeConfig` from a profile and the global defaults.
///
/// Profile values win; anything unset keeps the core default.
pub fn profile_to_realtime_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<RealtimeConfig, ConfigError> {
    let api_url = parse_api_url(&profile.api_url)?;

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    if profile.poll_interval == Some(0) {
        return Err(ConfigError::Validation {
            field: "poll_interval".into(),
            reason: "must be at least 1 second".into(),
        });
    }

    let base = RealtimeConfig::default();
    Ok(RealtimeConfig {
        api_url,
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        poll_interval: profile
            .poll_interval
            .map_or(base.poll_interval, Duration::from_secs),
        poll_limit: profile.poll_limit.unwrap_or(base.poll_limit),
        pending_ttl: profile
            .pending_ttl
            .map_or(base.pending_ttl, Duration::from_secs),
        persistent: profile.persistent.unwrap_or(base.persistent),
        ..base
    })
}

// ── Token storage ───────────────────────────────────────────────────

/// Keyring entry name for one token of one profile.
pub fn keyring_entry_name(profile_name: &str, key: TokenKey) -> String {
    format!("{profile_name}/{}", key.as_str())
}

/// Session tokens kept in the system keyring, one entry per profile and key.
pub struct KeyringTokenStore {
    profile: String,
}

impl KeyringTokenStore {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
        }
    }

    fn entry(&self, key: TokenKey) -> Result<keyring::Entry, keyring::Error> {
        keyring::Entry::new(KEYRING_SERVICE, &keyring_entry_name(&self.profile, key))
    }
}

fn keyring_error(err: &keyring::Error) -> orderbell_api::Error {
    orderbell_api::Error::TokenStore(err.to_string())
}

impl TokenStore for KeyringTokenStore {
    fn load(&self, key: TokenKey) -> Option<SecretString> {
        match self.entry(key).and_then(|entry| entry.get_password()) {
            Ok(value) => Some(SecretString::from(value)),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                debug!(error = %e, key = key.as_str(), "keyring read failed");
                None
            }
        }
    }

    fn save(&self, key: TokenKey, value: &SecretString) -> Result<(), orderbell_api::Error> {
        self.entry(key)
            .and_then(|entry| entry.set_password(value.expose_secret()))
            .map_err(|e| keyring_error(&e))
    }

    fn remove(&self, key: TokenKey) -> Result<(), orderbell_api::Error> {
        match self.entry(key).and_then(|entry| entry.delete_credential()) {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(keyring_error(&e)),
        }
    }
}

/// Pick the token store for a profile.
///
/// An explicit bearer token (flag or `ORDERBELL_TOKEN`) lives in memory
/// for this process only; otherwise tokens come from the keyring.
pub fn token_store(profile_name: &str, token_override: Option<&str>) -> Arc<dyn TokenStore> {
    match token_override {
        Some(token) => Arc::new(MemoryTokenStore::with_access_token(token)),
        None => Arc::new(KeyringTokenStore::new(profile_name)),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert_eq!(config.defaults.output, "table");
        assert_eq!(config.defaults.timeout, 30);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn profiles_load_from_toml() {
        let (_dir, path) = write_config(
            r#"
default_profile = "shop"

[defaults]
output = "json"

[profiles.shop]
api_url = "https://shop.example/api"
email = "staff@shop.example"
poll_interval = 15
persistent = false
"#,
        );

        let config = load_config_from(&path).unwrap();
        let profile = config.profile("shop").unwrap();

        assert_eq!(config.default_profile.as_deref(), Some("shop"));
        assert_eq!(config.defaults.output, "json");
        assert_eq!(config.defaults.color, "auto");
        assert_eq!(profile.email.as_deref(), Some("staff@shop.example"));
        assert_eq!(profile.poll_interval, Some(15));
        assert_eq!(profile.persistent, Some(false));
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config
            .profiles
            .insert("kitchen".into(), Profile::new("http://localhost:5000/api"));
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(
            loaded.profile("kitchen").unwrap(),
            &Profile::new("http://localhost:5000/api")
        );
    }

    #[test]
    fn unknown_profile_lists_available_ones() {
        let mut config = Config::default();
        config.profiles.insert("b".into(), Profile::new("http://b"));
        config.profiles.insert("a".into(), Profile::new("http://a"));

        match config.profile("c") {
            Err(ConfigError::ProfileNotFound { name, available }) => {
                assert_eq!(name, "c");
                assert_eq!(available, "a, b");
            }
            other => panic!("expected ProfileNotFound, got {other:?}"),
        }
    }

    #[test]
    fn profile_overrides_reach_realtime_config() {
        let profile = Profile {
            poll_interval: Some(12),
            poll_limit: Some(25),
            pending_ttl: Some(90),
            timeout: Some(5),
            persistent: Some(false),
            ..Profile::new("https://shop.example/api")
        };

        let config = profile_to_realtime_config(&profile, &Defaults::default()).unwrap();

        assert_eq!(config.api_url.as_str(), "https://shop.example/api");
        assert_eq!(config.tls, TlsVerification::SystemDefaults);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_secs(12));
        assert_eq!(config.poll_limit, 25);
        assert_eq!(config.pending_ttl, Duration::from_secs(90));
        assert!(!config.persistent);
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
    }

    #[test]
    fn unset_fields_keep_core_defaults() {
        let config = profile_to_realtime_config(
            &Profile::new("http://localhost:5000/api"),
            &Defaults::default(),
        )
        .unwrap();
        let base = RealtimeConfig::default();

        assert_eq!(config.poll_interval, base.poll_interval);
        assert_eq!(config.poll_limit, base.poll_limit);
        assert_eq!(config.pending_ttl, base.pending_ttl);
        assert!(config.persistent);
    }

    #[test]
    fn tls_follows_insecure_then_ca_cert() {
        let with_ca = Profile {
            ca_cert: Some(PathBuf::from("/etc/shop-ca.pem")),
            ..Profile::new("https://shop.example/api")
        };
        let config = profile_to_realtime_config(&with_ca, &Defaults::default()).unwrap();
        assert_eq!(
            config.tls,
            TlsVerification::CustomCa(PathBuf::from("/etc/shop-ca.pem"))
        );

        let defaults = Defaults {
            insecure: true,
            ..Defaults::default()
        };
        let config = profile_to_realtime_config(&with_ca, &defaults).unwrap();
        assert_eq!(config.tls, TlsVerification::DangerAcceptInvalid);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let bad_url = Profile::new("not a url");
        assert!(matches!(
            profile_to_realtime_config(&bad_url, &Defaults::default()),
            Err(ConfigError::Validation { ref field, .. }) if field == "api_url"
        ));

        let bad_scheme = Profile::new("ftp://shop.example/api");
        assert!(matches!(
            profile_to_realtime_config(&bad_scheme, &Defaults::default()),
            Err(ConfigError::Validation { .. })
        ));

        let zero_poll = Profile {
            poll_interval: Some(0),
            ..Profile::new("https://shop.example/api")
        };
        assert!(matches!(
            profile_to_realtime_config(&zero_poll, &Defaults::default()),
            Err(ConfigError::Validation { ref field, .. }) if field == "poll_interval"
        ));
    }

    #[test]
    fn keyring_entries_are_scoped_per_profile() {
        assert_eq!(
            keyring_entry_name("shop", TokenKey::Access),
            "shop/auth_token"
        );
        assert_eq!(
            keyring_entry_name("shop", TokenKey::Refresh),
            "shop/refresh_token"
        );
    }

    #[test]
    fn explicit_token_bypasses_keyring() {
        let store = token_store("shop", Some("abc.def.ghi"));
        assert_eq!(
            store.load(TokenKey::Access).unwrap().expose_secret(),
            "abc.def.ghi"
        );
        assert!(store.load(TokenKey::Refresh).is_none());
    }
}
