use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// A verification session binding one login attempt to one user.
///
/// Only the SHA-256 hash of the nonce is stored. A nonce is usable while
/// `consumed` is false and `expires_at` is in the future; it is good for
/// at most one successful verification.
#[derive(Debug, Clone, FromRow)]
pub struct VerificationNonce {
    pub id: Uuid,
    pub user_id: Uuid,
    pub nonce_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl VerificationNonce {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.consumed && self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn nonce(consumed: bool, expires_in_secs: i64) -> VerificationNonce {
        let now = Utc::now();
        VerificationNonce {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            nonce_hash: "abc".to_string(),
            issued_at: now,
            expires_at: now + Duration::seconds(expires_in_secs),
            consumed,
            consumed_at: None,
        }
    }

    #[test]
    fn test_usable_fresh_nonce() {
        assert!(nonce(false, 300).is_usable(Utc::now()));
    }

    #[test]
    fn test_consumed_nonce_is_not_usable() {
        assert!(!nonce(true, 300).is_usable(Utc::now()));
    }

    #[test]
    fn test_expired_nonce_is_not_usable() {
        assert!(!nonce(false, -1).is_usable(Utc::now()));
    }
}
