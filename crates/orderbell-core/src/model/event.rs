// ── Real-time event domain types ──
//
// Every message the transport publishes is a `RealtimeEvent`. Stream
// envelopes and polled order records are normalized into these types
// before anyone sees them, so subscribers never deal with wire shapes.

use chrono::{DateTime, Utc};
use orderbell_api::{OrderRecord, StreamEnvelope};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Names of the events carried on the bus.
///
/// The string forms match the type tags used on the wire.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
pub enum EventKind {
    #[serde(rename = "connected")]
    #[strum(serialize = "connected")]
    Connected,
    #[serde(rename = "order.created")]
    #[strum(serialize = "order.created")]
    OrderCreated,
    #[serde(rename = "order.updated")]
    #[strum(serialize = "order.updated")]
    OrderUpdated,
    #[serde(rename = "order.status_changed")]
    #[strum(serialize = "order.status_changed")]
    OrderStatusChanged,
    #[serde(rename = "pending.count")]
    #[strum(serialize = "pending.count")]
    PendingCount,
    #[serde(rename = "ping")]
    #[strum(serialize = "ping")]
    Ping,
    #[serde(rename = "connection.stateChange")]
    #[strum(serialize = "connection.stateChange")]
    ConnectionStateChange,
    #[serde(rename = "auth.failure")]
    #[strum(serialize = "auth.failure")]
    AuthFailure,
}

/// Lifecycle of the real-time channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// A newly placed order, normalized for notification consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingOrderEvent {
    pub order_id: String,
    pub order_number: Option<String>,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub items_count: u32,
    pub total: f64,
    pub placed_at: DateTime<Utc>,
    /// `placed_at` is the local receive time; the record had none.
    #[serde(skip)]
    pub placed_at_estimated: bool,
    pub status: String,
    /// The record exactly as received.
    pub order_data: Value,
}

impl PendingOrderEvent {
    /// Normalize an order record. A record without a placement time is
    /// stamped with `received_at`.
    pub fn from_record(record: &OrderRecord, received_at: DateTime<Utc>) -> Self {
        Self {
            order_id: record.id.clone(),
            order_number: record.order_number.clone(),
            customer_name: record.customer_name().unwrap_or("Guest").to_owned(),
            customer_phone: record.customer_phone().map(str::to_owned),
            items_count: record.items_count(),
            total: record.total.unwrap_or_default(),
            placed_at: record.created_at.unwrap_or(received_at),
            placed_at_estimated: record.created_at.is_none(),
            status: record.status.clone().unwrap_or_else(|| "pending".into()),
            order_data: serde_json::to_value(record).unwrap_or(Value::Null),
        }
    }

    /// The placement time the server reported, if it reported one.
    pub fn reported_placed_at(&self) -> Option<DateTime<Utc>> {
        (!self.placed_at_estimated).then_some(self.placed_at)
    }
}

/// A change to an existing order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderUpdate {
    pub order_id: String,
    pub status: Option<String>,
    pub previous_status: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub order_data: Value,
}

impl OrderUpdate {
    fn from_payload(payload: Value) -> Option<Self> {
        let order_id = first_str(&payload, &["_id", "id", "orderId"])?;
        Some(Self {
            order_id,
            status: first_str(&payload, &["status", "newStatus"]),
            previous_status: first_str(&payload, &["previousStatus", "oldStatus"]),
            updated_at: first_str(&payload, &["updatedAt"])
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            order_data: payload,
        })
    }
}

fn first_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .map(str::to_owned)
}

/// Everything the transport publishes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum RealtimeEvent {
    #[serde(rename = "connected")]
    Connected { message: Option<String> },
    #[serde(rename = "order.created")]
    OrderCreated(PendingOrderEvent),
    #[serde(rename = "order.updated")]
    OrderUpdated(OrderUpdate),
    #[serde(rename = "order.status_changed")]
    OrderStatusChanged(OrderUpdate),
    #[serde(rename = "pending.count")]
    PendingCount(u64),
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "connection.stateChange")]
    ConnectionStateChanged(ConnectionState),
    #[serde(rename = "auth.failure")]
    AuthFailure { reason: String },
}

/// Why a stream envelope could not become an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The type tag is not one the stream is expected to carry.
    UnknownType(String),
    /// The tag is known but the payload has the wrong shape.
    Malformed { kind: EventKind, reason: String },
}

impl RealtimeEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Connected { .. } => EventKind::Connected,
            Self::OrderCreated(_) => EventKind::OrderCreated,
            Self::OrderUpdated(_) => EventKind::OrderUpdated,
            Self::OrderStatusChanged(_) => EventKind::OrderStatusChanged,
            Self::PendingCount(_) => EventKind::PendingCount,
            Self::Ping => EventKind::Ping,
            Self::ConnectionStateChanged(_) => EventKind::ConnectionStateChange,
            Self::AuthFailure { .. } => EventKind::AuthFailure,
        }
    }

    /// Translate a decoded stream envelope.
    ///
    /// Local-only kinds (`connection.stateChange`, `auth.failure`) are
    /// never accepted from the wire.
    pub fn from_envelope(
        envelope: &StreamEnvelope,
        received_at: DateTime<Utc>,
    ) -> Result<Self, EnvelopeError> {
        let kind: EventKind = envelope
            .kind
            .parse()
            .map_err(|_| EnvelopeError::UnknownType(envelope.kind.clone()))?;
        let payload = envelope.payload();
        let malformed = |reason: &str| EnvelopeError::Malformed {
            kind,
            reason: reason.to_owned(),
        };

        match kind {
            EventKind::Connected => Ok(Self::Connected {
                message: first_str(&payload, &["message"]),
            }),
            EventKind::OrderCreated => {
                let record: OrderRecord =
                    serde_json::from_value(payload).map_err(|e| malformed(&e.to_string()))?;
                Ok(Self::OrderCreated(PendingOrderEvent::from_record(
                    &record,
                    received_at,
                )))
            }
            EventKind::OrderUpdated => OrderUpdate::from_payload(payload)
                .map(Self::OrderUpdated)
                .ok_or_else(|| malformed("missing order id")),
            EventKind::OrderStatusChanged => OrderUpdate::from_payload(payload)
                .map(Self::OrderStatusChanged)
                .ok_or_else(|| malformed("missing order id")),
            EventKind::PendingCount => count_from(&payload)
                .map(Self::PendingCount)
                .ok_or_else(|| malformed("missing count")),
            EventKind::Ping => Ok(Self::Ping),
            EventKind::ConnectionStateChange | EventKind::AuthFailure => {
                Err(EnvelopeError::UnknownType(envelope.kind.clone()))
            }
        }
    }
}

fn count_from(payload: &Value) -> Option<u64> {
    payload.as_u64().or_else(|| {
        ["count", "pendingCount", "total"]
            .iter()
            .find_map(|k| payload.get(*k).and_then(Value::as_u64))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn envelope(value: Value) -> StreamEnvelope {
        serde_json::from_value(value).expect("valid envelope")
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:30:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn kind_names_match_wire_tags() {
        assert_eq!(EventKind::OrderStatusChanged.to_string(), "order.status_changed");
        assert_eq!(
            "connection.stateChange".parse::<EventKind>(),
            Ok(EventKind::ConnectionStateChange)
        );
        assert!("order.deleted".parse::<EventKind>().is_err());
    }

    #[test]
    fn order_created_is_normalized() {
        let env = envelope(json!({
            "type": "order.created",
            "data": {
                "_id": "o-1",
                "orderNumber": "ORD-1",
                "customerInfo": { "name": "Ada", "phone": "555" },
                "items": [{}, {}],
                "totalAmount": 21.5,
                "status": "pending",
                "createdAt": "2026-03-01T12:00:00Z"
            }
        }));

        let Ok(RealtimeEvent::OrderCreated(order)) = RealtimeEvent::from_envelope(&env, now())
        else {
            panic!("expected order.created");
        };
        assert_eq!(order.order_id, "o-1");
        assert_eq!(order.customer_name, "Ada");
        assert_eq!(order.items_count, 2);
        assert!((order.total - 21.5).abs() < f64::EPSILON);
        assert_eq!(order.placed_at.to_rfc3339(), "2026-03-01T12:00:00+00:00");
        assert_eq!(order.reported_placed_at(), Some(order.placed_at));
    }

    #[test]
    fn missing_placement_time_uses_receipt_time() {
        let env = envelope(json!({ "type": "order.created", "data": { "_id": "o-2" } }));
        let Ok(RealtimeEvent::OrderCreated(order)) = RealtimeEvent::from_envelope(&env, now())
        else {
            panic!("expected order.created");
        };
        assert_eq!(order.placed_at, now());
        assert!(order.placed_at_estimated);
        assert_eq!(order.reported_placed_at(), None);
        assert_eq!(order.customer_name, "Guest");
    }

    #[test]
    fn pending_count_accepts_bare_number_and_object() {
        let bare = envelope(json!({ "type": "pending.count", "data": 3 }));
        let object = envelope(json!({ "type": "pending.count", "data": { "count": 5 } }));
        assert_eq!(
            RealtimeEvent::from_envelope(&bare, now()),
            Ok(RealtimeEvent::PendingCount(3))
        );
        assert_eq!(
            RealtimeEvent::from_envelope(&object, now()),
            Ok(RealtimeEvent::PendingCount(5))
        );
    }

    #[test]
    fn status_change_reads_previous_status() {
        let env = envelope(json!({
            "type": "order.status_changed",
            "data": { "orderId": "o-3", "status": "ready", "previousStatus": "preparing" }
        }));
        let Ok(RealtimeEvent::OrderStatusChanged(update)) =
            RealtimeEvent::from_envelope(&env, now())
        else {
            panic!("expected order.status_changed");
        };
        assert_eq!(update.order_id, "o-3");
        assert_eq!(update.status.as_deref(), Some("ready"));
        assert_eq!(update.previous_status.as_deref(), Some("preparing"));
    }

    #[test]
    fn unknown_and_local_only_types_are_rejected() {
        let unknown = envelope(json!({ "type": "menu.changed" }));
        let local = envelope(json!({ "type": "auth.failure" }));
        assert_eq!(
            RealtimeEvent::from_envelope(&unknown, now()),
            Err(EnvelopeError::UnknownType("menu.changed".into()))
        );
        assert!(matches!(
            RealtimeEvent::from_envelope(&local, now()),
            Err(EnvelopeError::UnknownType(_))
        ));
    }

    #[test]
    fn update_without_id_is_malformed() {
        let env = envelope(json!({ "type": "order.updated", "data": { "status": "x" } }));
        assert!(matches!(
            RealtimeEvent::from_envelope(&env, now()),
            Err(EnvelopeError::Malformed { kind: EventKind::OrderUpdated, .. })
        ));
    }
}
