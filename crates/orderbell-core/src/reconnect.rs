// ── Reconnect policy and failure classification ──
//
// Pure decision logic used by the transport. Kept free of I/O so the
// schedule and the expired-credential rule are unit-testable.

use std::time::Duration;

use chrono::{DateTime, Utc};
use orderbell_api::Credential;

/// Exponential backoff for stream reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Attempts allowed before the transport settles on polling.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before 1-based attempt `attempt`: `base * 2^(attempt - 1)`,
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// The attempt to schedule after `scheduled` attempts have already
    /// been made, or `None` once the budget is spent.
    pub fn next_attempt(&self, scheduled: u32) -> Option<(u32, Duration)> {
        if scheduled >= self.max_attempts {
            return None;
        }
        let attempt = scheduled + 1;
        Some((attempt, self.delay_for(attempt)))
    }
}

/// How the transport should react to a failed or dropped stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The server turned the stream down because the credential is stale.
    CredentialExpired,
    /// Anything else: back off and retry.
    Other,
}

/// Classify a stream failure.
///
/// A stream the server closed before delivering anything, while the held
/// credential is past its expiry, cannot be decoded, or is absent, is
/// treated as an expired credential. A token without an `exp` claim is
/// never expired. Everything else is `Other`.
pub fn classify_failure(
    closed_immediately: bool,
    credential: Option<&Credential>,
    now: DateTime<Utc>,
) -> FailureKind {
    let expired = credential.is_none_or(|c| c.is_expired(now));
    if closed_immediately && expired {
        FailureKind::CredentialExpired
    } else {
        FailureKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use orderbell_api::Expiry;
    use secrecy::SecretString;

    fn credential(expiry: Expiry) -> Credential {
        Credential::new(SecretString::from("tok".to_string()), expiry)
    }

    #[test]
    fn delays_double_from_base() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=5).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn delay_is_capped() {
        let policy = ReconnectPolicy {
            max_delay: Duration::from_secs(10),
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.delay_for(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[test]
    fn attempts_stop_at_budget() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.next_attempt(0), Some((1, Duration::from_secs(1))));
        assert_eq!(policy.next_attempt(4), Some((5, Duration::from_secs(16))));
        assert_eq!(policy.next_attempt(5), None);
    }

    #[test]
    fn immediate_close_with_expired_token_is_credential_expired() {
        let now = Utc::now();
        let stale = credential(Expiry::At(now - TimeDelta::minutes(1)));
        assert_eq!(
            classify_failure(true, Some(&stale), now),
            FailureKind::CredentialExpired
        );
    }

    #[test]
    fn undecodable_or_missing_token_counts_as_expired() {
        let now = Utc::now();
        assert_eq!(
            classify_failure(true, Some(&credential(Expiry::Undecodable)), now),
            FailureKind::CredentialExpired
        );
        assert_eq!(classify_failure(true, None, now), FailureKind::CredentialExpired);
    }

    #[test]
    fn valid_token_or_late_drop_is_other() {
        let now = Utc::now();
        let fresh = credential(Expiry::At(now + TimeDelta::hours(1)));
        let stale = credential(Expiry::At(now - TimeDelta::hours(1)));
        assert_eq!(classify_failure(true, Some(&fresh), now), FailureKind::Other);
        assert_eq!(classify_failure(false, Some(&stale), now), FailureKind::Other);
    }

    #[test]
    fn refusal_with_token_lacking_exp_is_other() {
        let now = Utc::now();
        assert_eq!(
            classify_failure(true, Some(&credential(Expiry::Never)), now),
            FailureKind::Other
        );
    }
}
