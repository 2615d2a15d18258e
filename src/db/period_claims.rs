/// Anti-replay period-claim ledger
///
/// One row per `(user_id, period_index)`. The composite primary key is
/// the whole mechanism: claiming is a single constrained insert, so two
/// requests racing on the same code cannot both succeed, no matter how
/// many processes serve traffic.
use crate::error::{MfaError, Result};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Atomically claim a TOTP period for a user.
///
/// Returns true if this call claimed the period, false if it was already
/// claimed (replay, or a concurrent request won the race). Never a
/// check-then-insert: the uniqueness constraint decides.
pub async fn claim(pool: &PgPool, user_id: Uuid, period_index: i64) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO claimed_periods (user_id, period_index, claimed_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (user_id, period_index) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(period_index)
    .execute(pool)
    .await
    .map_err(|e| MfaError::Database(e.to_string()))?;

    Ok(result.rows_affected() > 0)
}

/// Delete claims old enough to be outside any validity window
/// (maintenance operation; correctness never depends on it running).
pub async fn cleanup_stale(pool: &PgPool) -> Result<u64> {
    let threshold = Utc::now() - Duration::hours(24);

    let result = sqlx::query(
        r#"
        DELETE FROM claimed_periods
        WHERE claimed_at < $1
        "#,
    )
    .bind(threshold)
    .execute(pool)
    .await
    .map_err(|e| MfaError::Database(e.to_string()))?;

    Ok(result.rows_affected())
}
