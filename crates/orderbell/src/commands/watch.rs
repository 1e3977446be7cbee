//! `watch`: stream order notifications until interrupted.

use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::info;

use orderbell_core::{Callback, PendingOrderEvent, RealtimeEvent, RealtimeService, callback};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output::{self, emphasize, paint_state};

use super::orders::order_label;
use super::util;

// ── Line rendering ──────────────────────────────────────────────────

fn label(text: &str, color: bool) -> String {
    emphasize(&format!("{text:<7}"), color)
}

fn order_line(tag: &str, order: &PendingOrderEvent, color: bool) -> String {
    let phone = order
        .customer_phone
        .as_deref()
        .map(|p| format!(" ({p})"))
        .unwrap_or_default();
    let noun = if order.items_count == 1 { "item" } else { "items" };
    format!(
        "{}  {}  #{}  {}{phone}  {} {noun}  {:.2}",
        order
            .placed_at
            .with_timezone(&chrono::Local)
            .format("%H:%M:%S"),
        label(tag, color),
        order_label(order),
        order.customer_name,
        order.items_count,
        order.total,
    )
}

fn event_line(event: &RealtimeEvent, color: bool) -> String {
    let stamp = chrono::Local::now().format("%H:%M:%S");
    match event {
        RealtimeEvent::OrderCreated(order) => order_line("NEW", order, color),
        RealtimeEvent::OrderUpdated(update) => format!(
            "{stamp}  {}  {}  {}",
            label("UPDATED", color),
            update.order_id,
            update.status.as_deref().unwrap_or("-"),
        ),
        RealtimeEvent::OrderStatusChanged(update) => format!(
            "{stamp}  {}  {}  {} -> {}",
            label("STATUS", color),
            update.order_id,
            update.previous_status.as_deref().unwrap_or("?"),
            update.status.as_deref().unwrap_or("?"),
        ),
        RealtimeEvent::PendingCount(count) => {
            format!("{stamp}  {}  {count} waiting", label("PENDING", color))
        }
        RealtimeEvent::ConnectionStateChanged(state) => format!(
            "{stamp}  {}  {}",
            label("STATE", color),
            paint_state(*state, color)
        ),
        other => format!("{stamp}  {}", label(&other.kind().to_string(), color)),
    }
}

/// One identifier per event for `--output plain`.
fn event_id(event: &RealtimeEvent) -> String {
    match event {
        RealtimeEvent::OrderCreated(order) => order.order_id.clone(),
        RealtimeEvent::OrderUpdated(update) | RealtimeEvent::OrderStatusChanged(update) => {
            update.order_id.clone()
        }
        RealtimeEvent::PendingCount(count) => count.to_string(),
        RealtimeEvent::ConnectionStateChanged(state) => state.to_string(),
        other => other.kind().to_string(),
    }
}

fn forward(tx: &UnboundedSender<RealtimeEvent>) -> Callback {
    let tx = tx.clone();
    callback(move |event| {
        let _ = tx.send(event.clone());
    })
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    service: &RealtimeService,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(&global.color);

    if args.backlog > 0 {
        let mut backlog = service.pending_orders(args.backlog).await?;
        backlog.reverse();
        for order in &backlog {
            let out = output::render_stream_item(
                &global.output,
                order,
                |o| order_line("WAITING", o, color),
                |o| o.order_id.clone(),
            );
            output::print_output(&out, global.quiet);
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<RealtimeEvent>();
    let mut subscriptions = Vec::new();

    let mut kinds = Vec::new();
    for event in &args.events {
        if !kinds.contains(&event.kind()) {
            kinds.push(event.kind());
        }
    }
    for kind in kinds {
        subscriptions.push(service.subscribe(kind, forward(&tx))?);
    }
    if !args.no_state {
        subscriptions.push(service.on_connection_change(forward(&tx)));
    }
    if !args.no_count {
        subscriptions.push(service.on_pending_count(forward(&tx)));
    }
    subscriptions.push(service.on_auth_failure(forward(&tx)));
    drop(tx);

    service.start().await;
    info!(subscriptions = subscriptions.len(), "watching orders");

    let shutdown = util::shutdown_signal();
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            () = &mut shutdown => break Ok(()),
            event = rx.recv() => match event {
                Some(RealtimeEvent::AuthFailure { reason }) => {
                    break Err(CliError::AuthFailed { message: reason });
                }
                Some(event) => {
                    let out = output::render_stream_item(
                        &global.output,
                        &event,
                        |e| event_line(e, color),
                        event_id,
                    );
                    output::print_output(&out, global.quiet);
                }
                None => break Ok(()),
            },
        }
    };

    for sub in &subscriptions {
        sub.unsubscribe();
    }
    service.stop();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use orderbell_core::{ConnectionState, OrderUpdate};
    use serde_json::Value;

    fn order() -> PendingOrderEvent {
        PendingOrderEvent {
            order_id: "o-2".into(),
            order_number: Some("ORD-2".into()),
            customer_name: "Ada".into(),
            customer_phone: Some("555-0100".into()),
            items_count: 1,
            total: 14.5,
            placed_at: Utc::now(),
            placed_at_estimated: false,
            status: "pending".into(),
            order_data: Value::Null,
        }
    }

    #[test]
    fn new_order_line_names_customer_and_total() {
        let line = event_line(&RealtimeEvent::OrderCreated(order()), false);
        assert!(line.contains("NEW"));
        assert!(line.contains("#ORD-2"));
        assert!(line.contains("Ada (555-0100)"));
        assert!(line.contains("1 item "));
        assert!(line.contains("14.50"));
    }

    #[test]
    fn status_change_line_shows_transition() {
        let update = OrderUpdate {
            order_id: "o-1".into(),
            status: Some("ready".into()),
            previous_status: Some("pending".into()),
            updated_at: None,
            order_data: Value::Null,
        };
        let line = event_line(&RealtimeEvent::OrderStatusChanged(update), false);
        assert!(line.contains("pending -> ready"));
    }

    #[test]
    fn plain_ids_per_event() {
        assert_eq!(event_id(&RealtimeEvent::OrderCreated(order())), "o-2");
        assert_eq!(event_id(&RealtimeEvent::PendingCount(4)), "4");
        assert_eq!(
            event_id(&RealtimeEvent::ConnectionStateChanged(
                ConnectionState::Connected
            )),
            "connected"
        );
    }
}
