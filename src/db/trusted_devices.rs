/// Trusted-device database operations
///
/// One row per trust grant, keyed by the unique hash of the bearer
/// token. Rotation swaps rows inside a single transaction so there is no
/// state in which the old and the new token are both live.
use crate::error::{MfaError, Result};
use crate::models::{DeviceContext, TrustedDevice};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const DEVICE_COLUMNS: &str = r#"
    id, user_id, token_hash, device_fingerprint, device_name,
    first_ip, last_ip, last_user_agent,
    created_at, last_seen_at, expires_at,
    revoked, revoked_at, revoke_reason
"#;

/// Insert a new trust grant.
pub async fn insert_device(
    pool: &PgPool,
    user_id: Uuid,
    token_hash: &str,
    context: &DeviceContext,
    expires_at: DateTime<Utc>,
) -> Result<TrustedDevice> {
    let query = format!(
        r#"
        INSERT INTO trusted_devices (
            id, user_id, token_hash, device_fingerprint, device_name,
            first_ip, last_ip, last_user_agent,
            created_at, last_seen_at, expires_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $6, $7, NOW(), NOW(), $8)
        RETURNING {DEVICE_COLUMNS}
        "#
    );

    let device = sqlx::query_as::<_, TrustedDevice>(&query)
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token_hash)
        .bind(context.device_fingerprint.as_deref())
        .bind(context.device_name.as_deref())
        .bind(context.ip_address.as_deref())
        .bind(context.user_agent.as_deref())
        .bind(expires_at)
        .fetch_one(pool)
        .await
        .map_err(|e| MfaError::Database(e.to_string()))?;

    Ok(device)
}

/// Look up a grant by token hash, regardless of state.
///
/// The caller distinguishes revoked / expired / live so failures can be
/// reported by kind.
pub async fn find_by_token_hash(pool: &PgPool, token_hash: &str) -> Result<Option<TrustedDevice>> {
    let query = format!(
        r#"
        SELECT {DEVICE_COLUMNS}
        FROM trusted_devices
        WHERE token_hash = $1
        "#
    );

    let device = sqlx::query_as::<_, TrustedDevice>(&query)
        .bind(token_hash)
        .fetch_optional(pool)
        .await
        .map_err(|e| MfaError::Database(e.to_string()))?;

    Ok(device)
}

/// Record device activity on a successful check.
pub async fn touch(
    pool: &PgPool,
    device_id: Uuid,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE trusted_devices
        SET last_seen_at = NOW(),
            last_ip = COALESCE($2, last_ip),
            last_user_agent = COALESCE($3, last_user_agent)
        WHERE id = $1
        "#,
    )
    .bind(device_id)
    .bind(ip_address)
    .bind(user_agent)
    .execute(pool)
    .await
    .map_err(|e| MfaError::Database(e.to_string()))?;

    Ok(())
}

/// Rotate a grant: revoke the row matching `old_token_hash` and insert
/// the replacement in the same transaction.
///
/// Returns `None` when the old grant was already revoked or rotated by a
/// concurrent request; the conditional update is the arbiter.
pub async fn rotate(
    pool: &PgPool,
    user_id: Uuid,
    old_token_hash: &str,
    new_token_hash: &str,
    context: &DeviceContext,
    expires_at: DateTime<Utc>,
) -> Result<Option<TrustedDevice>> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| MfaError::Database(e.to_string()))?;

    let revoked = sqlx::query(
        r#"
        UPDATE trusted_devices
        SET revoked = TRUE, revoked_at = NOW(), revoke_reason = 'rotated'
        WHERE token_hash = $1 AND user_id = $2 AND revoked = FALSE
        "#,
    )
    .bind(old_token_hash)
    .bind(user_id)
    .execute(&mut *tx)
    .await
    .map_err(|e| MfaError::Database(e.to_string()))?;

    if revoked.rows_affected() == 0 {
        tx.rollback()
            .await
            .map_err(|e| MfaError::Database(e.to_string()))?;
        return Ok(None);
    }

    let query = format!(
        r#"
        INSERT INTO trusted_devices (
            id, user_id, token_hash, device_fingerprint, device_name,
            first_ip, last_ip, last_user_agent,
            created_at, last_seen_at, expires_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $6, $7, NOW(), NOW(), $8)
        RETURNING {DEVICE_COLUMNS}
        "#
    );

    let device = sqlx::query_as::<_, TrustedDevice>(&query)
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(new_token_hash)
        .bind(context.device_fingerprint.as_deref())
        .bind(context.device_name.as_deref())
        .bind(context.ip_address.as_deref())
        .bind(context.user_agent.as_deref())
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| MfaError::Database(e.to_string()))?;

    tx.commit()
        .await
        .map_err(|e| MfaError::Database(e.to_string()))?;

    Ok(Some(device))
}

/// Revoke one grant. Idempotent: revoking an already-revoked device is a
/// no-op, not an error.
pub async fn revoke(
    pool: &PgPool,
    device_id: Uuid,
    user_id: Uuid,
    reason: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE trusted_devices
        SET revoked = TRUE, revoked_at = NOW(), revoke_reason = COALESCE($3, 'user_revoked')
        WHERE id = $1 AND user_id = $2 AND revoked = FALSE
        "#,
    )
    .bind(device_id)
    .bind(user_id)
    .bind(reason)
    .execute(pool)
    .await
    .map_err(|e| MfaError::Database(e.to_string()))?;

    Ok(())
}

/// Revoke every grant for a user (2FA disable, enrollment confirmation,
/// security incident).
pub async fn revoke_all_for_user(pool: &PgPool, user_id: Uuid, reason: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE trusted_devices
        SET revoked = TRUE, revoked_at = NOW(), revoke_reason = $2
        WHERE user_id = $1 AND revoked = FALSE
        "#,
    )
    .bind(user_id)
    .bind(reason)
    .execute(pool)
    .await
    .map_err(|e| MfaError::Database(e.to_string()))?;

    Ok(result.rows_affected())
}

/// List a user's live grants, most recently seen first.
pub async fn list_active(pool: &PgPool, user_id: Uuid) -> Result<Vec<TrustedDevice>> {
    let query = format!(
        r#"
        SELECT {DEVICE_COLUMNS}
        FROM trusted_devices
        WHERE user_id = $1 AND revoked = FALSE AND expires_at > NOW()
        ORDER BY last_seen_at DESC
        "#
    );

    let devices = sqlx::query_as::<_, TrustedDevice>(&query)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(|e| MfaError::Database(e.to_string()))?;

    Ok(devices)
}

/// Delete revoked and long-expired rows (maintenance operation).
pub async fn cleanup_dead(pool: &PgPool) -> Result<u64> {
    let threshold = Utc::now() - chrono::Duration::days(30);

    let result = sqlx::query(
        r#"
        DELETE FROM trusted_devices
        WHERE (revoked = TRUE AND revoked_at < $1)
           OR expires_at < $1
        "#,
    )
    .bind(threshold)
    .execute(pool)
    .await
    .map_err(|e| MfaError::Database(e.to_string()))?;

    Ok(result.rows_affected())
}
