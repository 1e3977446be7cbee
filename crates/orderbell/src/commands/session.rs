//! Login and logout handlers.

use dialoguer::Input;
use secrecy::SecretString;

use crate::cli::{GlobalOpts, LoginArgs};
use crate::config::Resolved;
use crate::error::CliError;

use super::util::prompt_err;

pub async fn login(
    resolved: &Resolved,
    args: LoginArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let email = match args.email.or_else(|| resolved.profile.email.clone()) {
        Some(email) => email,
        None => Input::new()
            .with_prompt("Email")
            .interact_text()
            .map_err(prompt_err)?,
    };

    let password = match args.password {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ").map_err(prompt_err)?,
    };
    if email.is_empty() || password.is_empty() {
        return Err(CliError::Validation {
            field: "credentials".into(),
            reason: "email and password cannot be empty".into(),
        });
    }

    let credential = resolved
        .session
        .login(&email, &SecretString::from(password))
        .await?;
    tracing::info!(profile = %resolved.profile_name, "logged in");

    if global.token.is_some() {
        eprintln!("note: --token is set; the new session lives in memory only");
    }
    if !global.quiet {
        match credential.expires_at() {
            Some(at) => eprintln!(
                "✓ Logged in as {email} (profile '{}', token valid until {})",
                resolved.profile_name,
                at.format("%Y-%m-%d %H:%M UTC")
            ),
            None => eprintln!("✓ Logged in as {email} (profile '{}')", resolved.profile_name),
        }
    }
    Ok(())
}

pub async fn logout(resolved: &Resolved, global: &GlobalOpts) -> Result<(), CliError> {
    resolved.session.logout().await?;
    if !global.quiet {
        eprintln!("✓ Logged out of profile '{}'", resolved.profile_name);
    }
    Ok(())
}
