/// Two-factor settings database operations
use crate::error::{MfaError, Result};
use crate::models::TwoFactorSettings;
use sqlx::PgPool;
use uuid::Uuid;

/// Fetch a user's two-factor settings row, if one exists.
pub async fn get_settings(pool: &PgPool, user_id: Uuid) -> Result<Option<TwoFactorSettings>> {
    let settings = sqlx::query_as::<_, TwoFactorSettings>(
        r#"
        SELECT user_id, enabled, secret, last_verified_at, created_at, updated_at
        FROM two_factor_settings
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| MfaError::Database(e.to_string()))?;

    Ok(settings)
}

/// Enable two-factor for a user, persisting the confirmed secret.
///
/// Upserts so re-enrollment after a disable reuses the same row.
pub async fn enable(pool: &PgPool, user_id: Uuid, secret: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO two_factor_settings (user_id, enabled, secret, last_verified_at, created_at, updated_at)
        VALUES ($1, TRUE, $2, NOW(), NOW(), NOW())
        ON CONFLICT (user_id) DO UPDATE SET
            enabled = TRUE,
            secret = EXCLUDED.secret,
            last_verified_at = NOW(),
            updated_at = NOW()
        "#,
    )
    .bind(user_id)
    .bind(secret)
    .execute(pool)
    .await
    .map_err(|e| MfaError::Database(e.to_string()))?;

    Ok(())
}

/// Disable two-factor and clear the secret (secret non-null iff enabled).
pub async fn disable(pool: &PgPool, user_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE two_factor_settings
        SET enabled = FALSE, secret = NULL, updated_at = NOW()
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(|e| MfaError::Database(e.to_string()))?;

    Ok(())
}

/// Record a successful verification.
pub async fn touch_last_verified(pool: &PgPool, user_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE two_factor_settings
        SET last_verified_at = NOW(), updated_at = NOW()
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(|e| MfaError::Database(e.to_string()))?;

    Ok(())
}
