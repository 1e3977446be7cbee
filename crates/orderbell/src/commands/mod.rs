//! Command dispatch: bridges CLI args -> core service -> output formatting.

pub mod config_cmd;
pub mod orders;
pub mod session;
pub mod status;
pub mod util;
pub mod watch;

use orderbell_core::RealtimeService;

use crate::cli::{Command, GlobalOpts};
use crate::config::Resolved;
use crate::error::CliError;

/// Dispatch a storefront-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    resolved: Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Login(args) => session::login(&resolved, args, global).await,
        Command::Logout => session::logout(&resolved, global).await,
        cmd => {
            resolved.require_login()?;
            let service =
                RealtimeService::from_config(resolved.realtime.clone(), resolved.session.clone())?;
            match cmd {
                Command::Watch(args) => watch::handle(&service, args, global).await,
                Command::Pending => orders::pending(&service, global).await,
                Command::Orders(args) => orders::list(&service, &args, global).await,
                Command::Status => status::handle(&service, global).await,
                // Session commands are matched above; Config and
                // Completions are handled before dispatch
                Command::Login(_)
                | Command::Logout
                | Command::Config(_)
                | Command::Completions(_) => unreachable!(),
            }
        }
    }
}
