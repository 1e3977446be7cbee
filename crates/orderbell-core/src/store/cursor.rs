// ── Poll cursor ──
//
// Remembers the newest order timestamp the polling fallback has seen so
// each poll only surfaces orders placed since the previous one.

use chrono::{DateTime, Utc};
use orderbell_api::OrderRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollCursor {
    last_seen: Option<DateTime<Utc>>,
}

impl PollCursor {
    /// A cursor that treats everything up to `at` as already seen.
    pub fn starting_at(at: DateTime<Utc>) -> Self {
        Self { last_seen: Some(at) }
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    /// Move the cursor forward to `at`. Never moves it back.
    pub fn observe(&mut self, at: DateTime<Utc>) {
        self.last_seen = Some(self.last_seen.map_or(at, |seen| seen.max(at)));
    }

    /// Return the records newer than the cursor, oldest first, and move
    /// the cursor to the newest timestamp in `orders`.
    ///
    /// Records without a timestamp cannot be ordered and are skipped.
    pub fn advance(&mut self, orders: &[OrderRecord]) -> Vec<OrderRecord> {
        let mut fresh: Vec<OrderRecord> = orders
            .iter()
            .filter(|o| {
                o.created_at
                    .is_some_and(|at| self.last_seen.is_none_or(|seen| at > seen))
            })
            .cloned()
            .collect();
        fresh.sort_by_key(|o| o.created_at);

        if let Some(newest) = orders.iter().filter_map(|o| o.created_at).max() {
            self.observe(newest);
        }
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order(id: &str, at: &str) -> OrderRecord {
        serde_json::from_value(json!({ "_id": id, "createdAt": at })).expect("valid order")
    }

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn only_newer_orders_are_returned_oldest_first() {
        let mut cursor = PollCursor::starting_at(ts("2026-03-01T12:00:00Z"));
        let page = vec![
            order("c", "2026-03-01T12:05:00Z"),
            order("b", "2026-03-01T12:01:00Z"),
            order("a", "2026-03-01T11:59:00Z"),
        ];

        let fresh: Vec<String> = cursor.advance(&page).into_iter().map(|o| o.id).collect();
        assert_eq!(fresh, vec!["b", "c"]);
        assert_eq!(cursor.last_seen(), Some(ts("2026-03-01T12:05:00Z")));
    }

    #[test]
    fn second_poll_of_same_page_is_empty() {
        let mut cursor = PollCursor::starting_at(ts("2026-03-01T12:00:00Z"));
        let page = vec![order("b", "2026-03-01T12:01:00Z")];
        assert_eq!(cursor.advance(&page).len(), 1);
        assert!(cursor.advance(&page).is_empty());
    }

    #[test]
    fn observe_never_moves_backwards() {
        let mut cursor = PollCursor::starting_at(ts("2026-03-01T12:00:00Z"));
        cursor.observe(ts("2026-03-01T11:00:00Z"));
        assert_eq!(cursor.last_seen(), Some(ts("2026-03-01T12:00:00Z")));
    }

    #[test]
    fn unseeded_cursor_accepts_everything() {
        let mut cursor = PollCursor::default();
        let page = vec![order("a", "2020-01-01T00:00:00Z")];
        assert_eq!(cursor.advance(&page).len(), 1);
    }
}
