//! Config subcommand handlers.

use dialoguer::Input;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Profile};
use crate::error::CliError;
use crate::output;

use super::util::{parse_value, prompt_err};

/// Keys accepted by `config set`.
const SETTABLE_KEYS: &str =
    "api_url, email, ca_cert, insecure, timeout, poll_interval, poll_limit, pending_ttl, persistent";

// ── Helpers ─────────────────────────────────────────────────────────

fn format_config(cfg: &Config) -> String {
    toml::to_string_pretty(cfg).unwrap_or_else(|e| format!("# failed to render config: {e}"))
}

/// Apply one `key = value` to a profile.
fn set_profile_value(profile: &mut Profile, key: &str, value: String) -> Result<(), CliError> {
    match key {
        "api_url" | "api-url" => {
            orderbell_config::parse_api_url(&value)?;
            profile.api_url = value;
        }
        "email" => profile.email = Some(value),
        "ca_cert" | "ca-cert" => profile.ca_cert = Some(value.into()),
        "insecure" => profile.insecure = Some(parse_value(key, &value, "'true' or 'false'")?),
        "persistent" => profile.persistent = Some(parse_value(key, &value, "'true' or 'false'")?),
        "timeout" => profile.timeout = Some(parse_value(key, &value, "a number (seconds)")?),
        "poll_interval" | "poll-interval" => {
            let secs: u64 = parse_value(key, &value, "a number (seconds)")?;
            if secs == 0 {
                return Err(CliError::Validation {
                    field: "poll_interval".into(),
                    reason: "must be at least 1 second".into(),
                });
            }
            profile.poll_interval = Some(secs);
        }
        "poll_limit" | "poll-limit" => profile.poll_limit = Some(parse_value(key, &value, "a number")?),
        "pending_ttl" | "pending-ttl" => {
            profile.pending_ttl = Some(parse_value(key, &value, "a number (seconds)")?);
        }
        other => {
            return Err(CliError::Validation {
                field: other.into(),
                reason: format!("unknown config key '{other}'. Valid keys: {SETTABLE_KEYS}"),
            });
        }
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            let config_path = config::config_path();
            eprintln!("orderbell -- configuration wizard");
            eprintln!("   Config path: {}\n", config_path.display());

            let profile_name: String = Input::new()
                .with_prompt("Profile name")
                .default("default".into())
                .interact_text()
                .map_err(prompt_err)?;

            let api_url: String = Input::new()
                .with_prompt("API URL")
                .default("http://localhost:5000/api".into())
                .validate_with(|input: &String| {
                    orderbell_config::parse_api_url(input)
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                })
                .interact_text()
                .map_err(prompt_err)?;

            let email: String = Input::new()
                .with_prompt("Staff email (optional)")
                .allow_empty(true)
                .interact_text()
                .map_err(prompt_err)?;

            let profile = Profile {
                email: (!email.is_empty()).then_some(email),
                ..Profile::new(api_url)
            };

            let mut cfg = config::load_config()?;
            cfg.profiles.insert(profile_name.clone(), profile);
            cfg.default_profile = Some(profile_name.clone());
            config::save_config(&cfg)?;

            eprintln!("\n✓ Configuration written to {}", config_path.display());
            eprintln!("  Active profile: {profile_name}");
            eprintln!("\n  Next: orderbell login");
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            let out = output::render_single(&global.output, &cfg, format_config, |c| {
                c.default_profile.clone().unwrap_or_default()
            });
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Set <key> <value> ───────────────────────────────────────
        ConfigCommand::Set { key, value } => {
            let mut cfg = config::load_config()?;
            let profile_name = config::active_profile_name(global, &cfg);

            let profile = cfg.profiles.entry(profile_name.clone()).or_default();
            set_profile_value(profile, &key, value)?;

            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Set {key} on profile '{profile_name}'");
            }
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let default = cfg.default_profile.as_deref().unwrap_or("default");
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured. Run: orderbell config init");
            } else {
                for name in cfg.profile_names() {
                    let marker = if name == default { " *" } else { "" };
                    println!("{name}{marker}");
                }
            }
            Ok(())
        }

        // ── Use <name> ─────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config()?;
            cfg.profile(&name)?;

            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("✓ Default profile set to '{name}'");
            }
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn set_updates_typed_fields() {
        let mut profile = Profile::default();
        set_profile_value(&mut profile, "api_url", "https://shop.example/api".into()).unwrap();
        set_profile_value(&mut profile, "poll-interval", "15".into()).unwrap();
        set_profile_value(&mut profile, "persistent", "false".into()).unwrap();

        assert_eq!(profile.api_url, "https://shop.example/api");
        assert_eq!(profile.poll_interval, Some(15));
        assert_eq!(profile.persistent, Some(false));
    }

    #[test]
    fn set_rejects_bad_values_and_keys() {
        let mut profile = Profile::default();
        assert!(set_profile_value(&mut profile, "api_url", "nope".into()).is_err());
        assert!(set_profile_value(&mut profile, "poll_interval", "0".into()).is_err());
        assert!(set_profile_value(&mut profile, "insecure", "maybe".into()).is_err());
        assert!(matches!(
            set_profile_value(&mut profile, "site", "x".into()),
            Err(CliError::Validation { ref field, .. }) if field == "site"
        ));
        assert_eq!(profile, Profile::default());
    }
}
