//! `status`: connect once and report the channel.

use std::fmt::Write as _;

use orderbell_core::{ConnectionState, RealtimeService, ServiceStats};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output::{self, paint_state};

fn detail(stats: &ServiceStats, api_url: &str, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "API:         {api_url}");
    let _ = writeln!(out, "State:       {}", paint_state(stats.state, color));
    let _ = writeln!(
        out,
        "Mode:        {}",
        if stats.polling { "polling" } else { "stream" }
    );
    let _ = writeln!(out, "Reconnects:  {}", stats.reconnect_attempts);
    let _ = write!(
        out,
        "Pending:     {}",
        stats
            .cached_pending
            .map_or_else(|| "unknown".into(), |n| n.to_string())
    );
    out
}

pub async fn handle(service: &RealtimeService, global: &GlobalOpts) -> Result<(), CliError> {
    service.start().await;
    let stats = service.stats();
    let pending = service.pending_orders_count(false).await;
    service.stop();

    let stats = ServiceStats {
        cached_pending: Some(pending),
        ..stats
    };
    let color = output::should_color(&global.color);
    let api_url = service.transport().config().api_url.to_string();

    let out = output::render_single(
        &global.output,
        &stats,
        |s| detail(s, &api_url, color),
        |s| s.state.to_string(),
    );
    output::print_output(&out, global.quiet);

    if stats.state == ConnectionState::Connected {
        Ok(())
    } else {
        Err(CliError::ConnectionFailed {
            url: api_url,
            reason: format!("channel is {}", stats.state),
        })
    }
}
