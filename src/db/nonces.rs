/// Verification-nonce database operations
///
/// A nonce binds one login attempt (after primary-credential success) to
/// one user. Expiry is enforced lazily against request time; consumption
/// is a conditional update so two racing requests cannot both win.
use crate::error::{MfaError, Result};
use crate::models::VerificationNonce;
use crate::security::token::{generate_nonce, hash_token};
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Result of issuing a nonce
#[derive(Debug)]
pub struct CreateNonceResult {
    /// The raw nonce (returned to the login flow, never stored)
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
}

/// Issue a fresh nonce for a user's login attempt.
pub async fn create_nonce(pool: &PgPool, user_id: Uuid, ttl_secs: i64) -> Result<CreateNonceResult> {
    let raw_nonce = generate_nonce();
    let nonce_hash = hash_token(&raw_nonce);
    let expires_at = Utc::now() + Duration::seconds(ttl_secs);
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO verification_nonces (id, user_id, nonce_hash, expires_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(&nonce_hash)
    .bind(expires_at)
    .execute(pool)
    .await
    .map_err(|e| MfaError::Database(e.to_string()))?;

    Ok(CreateNonceResult {
        nonce: raw_nonce,
        expires_at,
    })
}

/// Look up a usable nonce by its raw value.
///
/// Returns `None` when the nonce is unknown, already consumed, or past
/// its expiry; callers report all three as the same failure kind.
pub async fn find_usable(pool: &PgPool, raw_nonce: &str) -> Result<Option<VerificationNonce>> {
    let nonce_hash = hash_token(raw_nonce);

    let nonce = sqlx::query_as::<_, VerificationNonce>(
        r#"
        SELECT id, user_id, nonce_hash, issued_at, expires_at, consumed, consumed_at
        FROM verification_nonces
        WHERE nonce_hash = $1
          AND consumed = FALSE
          AND expires_at > NOW()
        "#,
    )
    .bind(&nonce_hash)
    .fetch_optional(pool)
    .await
    .map_err(|e| MfaError::Database(e.to_string()))?;

    Ok(nonce)
}

/// Consume a nonce. Conditional update: returns true only for the one
/// caller that flipped it.
pub async fn consume(pool: &PgPool, nonce_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE verification_nonces
        SET consumed = TRUE, consumed_at = NOW()
        WHERE id = $1
          AND consumed = FALSE
          AND expires_at > NOW()
        "#,
    )
    .bind(nonce_id)
    .execute(pool)
    .await
    .map_err(|e| MfaError::Database(e.to_string()))?;

    Ok(result.rows_affected() > 0)
}

/// Delete consumed and long-expired nonces (maintenance operation).
pub async fn cleanup_expired(pool: &PgPool) -> Result<u64> {
    let threshold = Utc::now() - Duration::hours(24);

    let result = sqlx::query(
        r#"
        DELETE FROM verification_nonces
        WHERE expires_at < $1
           OR (consumed = TRUE AND consumed_at < $1)
        "#,
    )
    .bind(threshold)
    .execute(pool)
    .await
    .map_err(|e| MfaError::Database(e.to_string()))?;

    Ok(result.rows_affected())
}
