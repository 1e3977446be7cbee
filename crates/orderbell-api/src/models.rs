// Wire types for the order API.
//
// The REST API wraps payloads as `{ success, data, message }`. Order
// records come from a document store, so identifiers arrive as `_id` and
// customer details may be nested or flat. Aliases absorb both shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Envelope ─────────────────────────────────────────────────────────

/// Standard response envelope.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

// ── Orders ───────────────────────────────────────────────────────────

/// Sort direction for order queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Query parameters for `GET /orders`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub sort_by: String,
    pub sort_order: SortOrder,
}

impl OrderQuery {
    /// Newest pending orders first, at most `limit` of them.
    pub fn pending(limit: u32) -> Self {
        Self {
            status: Some("pending".into()),
            limit,
            page: None,
            sort_by: "createdAt".into(),
            sort_order: SortOrder::Desc,
        }
    }
}

/// Customer details, when the API nests them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// One order as returned by `GET /orders` or pushed on the stream.
///
/// Unknown fields are kept in `extra` so nothing the server sends is lost.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    #[serde(alias = "_id", alias = "orderId")]
    pub id: String,

    #[serde(default)]
    pub order_number: Option<String>,

    #[serde(default, alias = "customerInfo")]
    pub customer: Option<CustomerInfo>,

    #[serde(default)]
    pub customer_name: Option<String>,

    #[serde(default)]
    pub customer_phone: Option<String>,

    #[serde(default)]
    pub items: Vec<Value>,

    #[serde(default)]
    pub items_count: Option<u32>,

    #[serde(default, alias = "totalAmount")]
    pub total: Option<f64>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default, alias = "placedAt")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OrderRecord {
    /// Customer name from the nested or flat shape.
    pub fn customer_name(&self) -> Option<&str> {
        self.customer
            .as_ref()
            .and_then(|c| c.name.as_deref())
            .or(self.customer_name.as_deref())
    }

    /// Customer phone from the nested or flat shape.
    pub fn customer_phone(&self) -> Option<&str> {
        self.customer
            .as_ref()
            .and_then(|c| c.phone.as_deref())
            .or(self.customer_phone.as_deref())
    }

    /// Number of line items, preferring an explicit count.
    pub fn items_count(&self) -> u32 {
        self.items_count
            .unwrap_or_else(|| u32::try_from(self.items.len()).unwrap_or(u32::MAX))
    }
}

/// Pagination block of an orders page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default)]
    pub total_orders: u64,
    #[serde(default)]
    pub current_page: Option<u32>,
    #[serde(default)]
    pub total_pages: Option<u32>,
}

/// `data` of `GET /orders`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrdersPage {
    #[serde(default)]
    pub orders: Vec<OrderRecord>,
    #[serde(default)]
    pub pagination: Pagination,
}

// ── Auth ─────────────────────────────────────────────────────────────

/// `data` of `POST /auth/login` and `POST /auth/refresh`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    #[serde(alias = "accessToken")]
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<Value>,
}

// ── Stream ───────────────────────────────────────────────────────────

/// Raw message pushed on the order stream.
///
/// Every message carries a `type` discriminator. The payload is either
/// under `data` or flattened next to `type`; [`payload`](Self::payload)
/// hides the difference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEnvelope {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub data: Value,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StreamEnvelope {
    /// The message payload: `data` when present, otherwise the remaining
    /// top-level fields.
    pub fn payload(&self) -> Value {
        if self.data.is_null() {
            Value::Object(self.extra.clone())
        } else {
            self.data.clone()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn order_record_accepts_document_store_shape() {
        let json = serde_json::json!({
            "_id": "665f1",
            "orderNumber": "ORD-1042",
            "customerInfo": { "name": "Ada", "phone": "555-0100" },
            "items": [{ "name": "Pho" }, { "name": "Spring rolls" }],
            "totalAmount": 23.5,
            "status": "pending",
            "createdAt": "2026-03-01T12:00:00Z",
            "deliveryType": "pickup"
        });

        let order: OrderRecord = serde_json::from_value(json).unwrap();
        assert_eq!(order.id, "665f1");
        assert_eq!(order.customer_name(), Some("Ada"));
        assert_eq!(order.customer_phone(), Some("555-0100"));
        assert_eq!(order.items_count(), 2);
        assert_eq!(order.total, Some(23.5));
        assert!(order.created_at.is_some());
        assert_eq!(order.extra["deliveryType"], "pickup");
    }

    #[test]
    fn order_record_accepts_flat_shape() {
        let json = serde_json::json!({
            "orderId": "o-7",
            "customerName": "Lin",
            "customerPhone": "555-0199",
            "itemsCount": 4,
            "total": 12.0,
            "placedAt": "2026-03-01T12:05:00Z"
        });

        let order: OrderRecord = serde_json::from_value(json).unwrap();
        assert_eq!(order.id, "o-7");
        assert_eq!(order.customer_name(), Some("Lin"));
        assert_eq!(order.items_count(), 4);
    }

    #[test]
    fn stream_envelope_payload_prefers_data() {
        let env: StreamEnvelope =
            serde_json::from_str(r#"{"type":"pending.count","data":{"count":5}}"#).unwrap();
        assert_eq!(env.kind, "pending.count");
        assert_eq!(env.payload()["count"], 5);

        let flat: StreamEnvelope =
            serde_json::from_str(r#"{"type":"pending.count","count":3}"#).unwrap();
        assert_eq!(flat.payload()["count"], 3);
    }

    #[test]
    fn pending_query_serializes_camel_case() {
        let query = OrderQuery::pending(10);
        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value["status"], "pending");
        assert_eq!(value["sortBy"], "createdAt");
        assert_eq!(value["sortOrder"], "desc");
        assert!(value.get("page").is_none());
    }
}
