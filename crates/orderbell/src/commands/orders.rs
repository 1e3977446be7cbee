//! Pending-order query handlers.

use serde::Serialize;
use tabled::Tabled;

use orderbell_core::{OrderSource, PendingOrderEvent, RealtimeService};

use crate::cli::{GlobalOpts, OrdersArgs, OutputFormat};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct OrderRow {
    #[tabled(rename = "Order")]
    number: String,
    #[tabled(rename = "Customer")]
    customer: String,
    #[tabled(rename = "Phone")]
    phone: String,
    #[tabled(rename = "Items")]
    items: u32,
    #[tabled(rename = "Total")]
    total: String,
    #[tabled(rename = "Placed")]
    placed: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl From<&PendingOrderEvent> for OrderRow {
    fn from(o: &PendingOrderEvent) -> Self {
        Self {
            number: order_label(o),
            customer: o.customer_name.clone(),
            phone: o.customer_phone.clone().unwrap_or_default(),
            items: o.items_count,
            total: format!("{:.2}", o.total),
            placed: o
                .placed_at
                .with_timezone(&chrono::Local)
                .format("%H:%M:%S")
                .to_string(),
            status: o.status.clone(),
        }
    }
}

/// The human-facing order number, falling back to the id.
pub(super) fn order_label(order: &PendingOrderEvent) -> String {
    order
        .order_number
        .clone()
        .unwrap_or_else(|| order.order_id.clone())
}

#[derive(Serialize)]
struct PendingCount {
    pending: u64,
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn pending(service: &RealtimeService, global: &GlobalOpts) -> Result<(), CliError> {
    let count = service.transport().orders().pending_count().await?;
    service.transport().pending().store(count);

    let out = output::render_single(
        &global.output,
        &PendingCount { pending: count },
        |c| c.pending.to_string(),
        |c| c.pending.to_string(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn list(
    service: &RealtimeService,
    args: &OrdersArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let orders = service.pending_orders(args.limit).await?;

    if orders.is_empty() && matches!(global.output, OutputFormat::Table) {
        if !global.quiet {
            eprintln!("No pending orders");
        }
        return Ok(());
    }

    let out = output::render_list(
        &global.output,
        &orders,
        |o| OrderRow::from(o),
        |o| o.order_id.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
