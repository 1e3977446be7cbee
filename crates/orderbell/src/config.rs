//! CLI configuration -- thin wrapper around `orderbell_config` shared types.
//!
//! Re-exports the shared types and adds resolution that respects
//! `GlobalOpts` flag overrides (--api-url, --token, --insecure, etc.).

use orderbell_api::{AuthClient, Session};
use orderbell_core::RealtimeConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use orderbell_config::{
    Config, Profile, config_path, load_config, load_config_or_default, save_config,
};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Everything a connected command needs.
pub struct Resolved {
    pub profile_name: String,
    pub profile: Profile,
    pub realtime: RealtimeConfig,
    pub session: Session,
}

impl Resolved {
    /// Fail unless a bearer token is available.
    pub fn require_login(&self) -> Result<(), CliError> {
        if self.session.credential().is_some() {
            Ok(())
        } else {
            Err(CliError::NotLoggedIn {
                profile: self.profile_name.clone(),
            })
        }
    }
}

/// Apply flag overrides to a profile.
///
/// Flags win over the profile; a missing profile is only acceptable when
/// `--api-url` supplies the address.
pub fn effective_profile(
    profile: Option<&Profile>,
    global: &GlobalOpts,
) -> Result<Profile, CliError> {
    let mut profile = match (profile, global.api_url.as_deref()) {
        (Some(p), _) => p.clone(),
        (None, Some(url)) => Profile::new(url),
        (None, None) => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
    };

    if let Some(ref url) = global.api_url {
        profile.api_url.clone_from(url);
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
    Ok(profile)
}

/// Load config, apply flags, and build the session.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);
    let profile = effective_profile(cfg.profiles.get(&profile_name), global)?;
    let realtime = orderbell_config::profile_to_realtime_config(&profile, &cfg.defaults)?;

    let store = orderbell_config::token_store(&profile_name, global.token.as_deref());
    let auth = AuthClient::new(realtime.api_url.clone(), &realtime.transport_config())?;
    let session = Session::new(auth, store);

    tracing::debug!(
        profile = %profile_name,
        api = %realtime.api_url,
        explicit_token = global.token.is_some(),
        "configuration resolved"
    );

    Ok(Resolved {
        profile_name,
        profile,
        realtime,
        session,
    })
}
