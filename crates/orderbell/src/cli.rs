//! Clap derive structures for the `orderbell` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

use orderbell_core::EventKind;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// orderbell -- live order notifications for restaurant staff
#[derive(Debug, Parser)]
#[command(
    name = "orderbell",
    version,
    about = "Watch incoming restaurant orders from the command line",
    long_about = "Streams new and updated orders from the storefront API as they happen.\n\n\
        Uses the server-push order stream, falling back to polling while the\n\
        stream is unavailable.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Storefront profile to use
    #[arg(long, short = 'p', env = "ORDERBELL_PROFILE", global = true)]
    pub profile: Option<String>,

    /// API base URL (overrides profile)
    #[arg(long, short = 'u', env = "ORDERBELL_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Bearer token to use instead of the stored session
    #[arg(long, env = "ORDERBELL_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "ORDERBELL_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "ORDERBELL_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "ORDERBELL_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in with a staff account and store the session
    Login(LoginArgs),

    /// Forget the stored session
    Logout,

    /// Stream order notifications until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Print the number of pending orders
    Pending,

    /// List the newest pending orders
    #[command(alias = "ls")]
    Orders(OrdersArgs),

    /// Connect once and report the notification channel's state
    Status,

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SESSION
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Staff email (defaults to the profile's email, else prompts)
    #[arg(long, short = 'e')]
    pub email: Option<String>,

    /// Password (prompts when omitted)
    #[arg(long, env = "ORDERBELL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  WATCH / ORDERS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Order events a watcher can follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WatchEvent {
    /// New orders
    Created,
    /// Edits to existing orders
    Updated,
    /// Status transitions
    Status,
}

impl WatchEvent {
    pub fn kind(self) -> EventKind {
        match self {
            Self::Created => EventKind::OrderCreated,
            Self::Updated => EventKind::OrderUpdated,
            Self::Status => EventKind::OrderStatusChanged,
        }
    }
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Order events to follow
    #[arg(
        long,
        short = 'e',
        value_delimiter = ',',
        default_values = ["created", "updated", "status"]
    )]
    pub events: Vec<WatchEvent>,

    /// Print the newest N pending orders before streaming
    #[arg(long, default_value = "0")]
    pub backlog: u32,

    /// Hide connection state changes
    #[arg(long)]
    pub no_state: bool,

    /// Hide pending-count updates
    #[arg(long)]
    pub no_count: bool,
}

#[derive(Debug, Args)]
pub struct OrdersArgs {
    /// Max orders to show (1-100)
    #[arg(long, short = 'l', default_value = "10", value_parser = clap::value_parser!(u32).range(1..=100))]
    pub limit: u32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current resolved configuration
    Show,

    /// Set a value on the active profile
    Set {
        /// Profile key (e.g., "api_url", "poll_interval")
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Print the config file path
    Path,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
