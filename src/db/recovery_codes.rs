/// Recovery-code store (Redis)
///
/// Codes live as a per-user Redis set of SHA-256 hashes of the
/// case-normalized code. `SREM` is the single-use gate: it removes and
/// reports atomically, so a code can be consumed exactly once even under
/// concurrent attempts.
use crate::error::{MfaError, Result};
use crate::security::secret::normalize_recovery_code;
use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};
use uuid::Uuid;

fn recovery_key(user_id: Uuid) -> String {
    format!("atrium:2fa:recovery:{user_id}")
}

fn hash_code(code: &str) -> String {
    let normalized = normalize_recovery_code(code);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Replace a user's recovery-code set with freshly issued codes.
pub async fn replace_codes(
    redis: &ConnectionManager,
    user_id: Uuid,
    codes: &[String],
) -> Result<()> {
    let key = recovery_key(user_id);
    let mut conn = redis.clone();

    redis::cmd("DEL")
        .arg(&key)
        .query_async::<_, ()>(&mut conn)
        .await
        .map_err(|e| MfaError::Redis(e.to_string()))?;

    let mut sadd = redis::cmd("SADD");
    sadd.arg(&key);
    for code in codes {
        sadd.arg(hash_code(code));
    }
    sadd.query_async::<_, ()>(&mut conn)
        .await
        .map_err(|e| MfaError::Redis(e.to_string()))?;

    Ok(())
}

/// Consume a recovery code (single use).
///
/// Returns true if the code was present and has now been removed.
pub async fn consume_code(redis: &ConnectionManager, user_id: Uuid, code: &str) -> Result<bool> {
    let key = recovery_key(user_id);
    let mut conn = redis.clone();

    let removed: i64 = redis::cmd("SREM")
        .arg(&key)
        .arg(hash_code(code))
        .query_async(&mut conn)
        .await
        .map_err(|e| MfaError::Redis(e.to_string()))?;

    Ok(removed > 0)
}

/// Number of unused recovery codes remaining.
pub async fn remaining(redis: &ConnectionManager, user_id: Uuid) -> Result<i64> {
    let key = recovery_key(user_id);
    let mut conn = redis.clone();

    let count: i64 = redis::cmd("SCARD")
        .arg(&key)
        .query_async(&mut conn)
        .await
        .map_err(|e| MfaError::Redis(e.to_string()))?;

    Ok(count)
}

/// Drop the whole set (on disable or re-enrollment).
pub async fn clear_codes(redis: &ConnectionManager, user_id: Uuid) -> Result<()> {
    let key = recovery_key(user_id);
    let mut conn = redis.clone();

    redis::cmd("DEL")
        .arg(&key)
        .query_async::<_, ()>(&mut conn)
        .await
        .map_err(|e| MfaError::Redis(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_code_is_case_insensitive() {
        assert_eq!(hash_code("ab12cd34"), hash_code("AB12CD34"));
        assert_eq!(hash_code(" AB12CD34 "), hash_code("ab12cd34"));
    }

    #[test]
    fn test_hash_code_distinguishes_codes() {
        assert_ne!(hash_code("AB12CD34"), hash_code("EF56GH78"));
    }
}
