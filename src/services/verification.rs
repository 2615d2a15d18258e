/// Login-time verification service
///
/// Implements the per-attempt state machine: a nonce is issued after
/// primary-credential success (externally), then exactly one
/// verification resolves it. Validation is pure and side-effect-free;
/// the period claim is the only mutation and the only replay gate.
use crate::config::{NonceSettings, TotpSettings};
use crate::db;
use crate::db::CreateNonceResult;
use crate::error::{MfaError, Result};
use crate::metrics;
use crate::security::{secret, totp};
use chrono::Utc;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use uuid::Uuid;

/// Verification service
#[derive(Clone)]
pub struct VerificationService {
    db: PgPool,
    redis: ConnectionManager,
    totp: TotpSettings,
    nonce: NonceSettings,
}

impl VerificationService {
    pub fn new(
        db: PgPool,
        redis: ConnectionManager,
        totp: TotpSettings,
        nonce: NonceSettings,
    ) -> Self {
        Self {
            db,
            redis,
            totp,
            nonce,
        }
    }

    /// Issue a short-lived, single-use verification nonce for a user
    /// whose primary credential has already been checked.
    pub async fn issue_nonce(&self, user_id: Uuid) -> Result<CreateNonceResult> {
        let result = db::nonces::create_nonce(&self.db, user_id, self.nonce.ttl_secs).await?;
        tracing::info!("Verification nonce issued for user: {}", user_id);
        Ok(result)
    }

    /// Verify a TOTP code for the login attempt bound to `raw_nonce`.
    ///
    /// Order matters: validation (pure) runs before any mutation, the
    /// period claim is a single atomic insert, and the nonce is consumed
    /// only once the attempt has resolved. `CodeAlreadyUsed` also
    /// consumes the nonce so a detected replay cannot be retried against
    /// the same session.
    pub async fn verify(&self, raw_nonce: &str, submitted_code: &str) -> Result<Uuid> {
        let nonce = db::nonces::find_usable(&self.db, raw_nonce)
            .await?
            .ok_or_else(|| {
                metrics::inc_verify_failures();
                MfaError::SessionExpired
            })?;

        let settings = db::two_factor::get_settings(&self.db, nonce.user_id).await?;
        let shared_secret = match settings {
            Some(ref s) if s.is_active() => s.secret.clone().unwrap_or_default(),
            _ => {
                metrics::inc_verify_failures();
                return Err(MfaError::NotEnrolled);
            }
        };

        let secret_bytes = secret::decode_secret(&shared_secret)
            .map_err(|_| MfaError::Internal("Stored secret is not valid base32".to_string()))?;

        let now = Utc::now().timestamp() as u64;
        let matched_period = totp::validate(
            &secret_bytes,
            submitted_code,
            now,
            self.totp.step_secs,
            self.totp.digits,
            self.totp.skew_window,
        );

        let Some(period) = matched_period else {
            metrics::inc_verify_failures();
            return Err(MfaError::InvalidCode);
        };

        // The anti-replay gate: a constrained insert, nothing else.
        let claimed = db::period_claims::claim(&self.db, nonce.user_id, period as i64).await?;
        if !claimed {
            // Replay is a security event: burn the session rather than
            // letting it retry.
            let _ = db::nonces::consume(&self.db, nonce.id).await;
            metrics::inc_verify_failures();
            metrics::inc_replay_rejections();
            tracing::warn!("Replayed code rejected for user: {}", nonce.user_id);
            return Err(MfaError::CodeAlreadyUsed);
        }

        if !db::nonces::consume(&self.db, nonce.id).await? {
            // A concurrent request resolved this session first.
            tracing::warn!(
                "Nonce consumed concurrently during verification for user: {}",
                nonce.user_id
            );
            metrics::inc_verify_failures();
            return Err(MfaError::SessionExpired);
        }

        db::two_factor::touch_last_verified(&self.db, nonce.user_id).await?;
        metrics::inc_verify_success();
        tracing::info!("Second factor verified for user: {}", nonce.user_id);

        Ok(nonce.user_id)
    }

    /// Verify a single-use recovery code for the login attempt bound to
    /// `raw_nonce`.
    ///
    /// The `SREM` on the hashed, case-normalized code is the atomic
    /// single-use removal; a miss mutates nothing.
    pub async fn verify_recovery(&self, raw_nonce: &str, submitted_code: &str) -> Result<Uuid> {
        let nonce = db::nonces::find_usable(&self.db, raw_nonce)
            .await?
            .ok_or_else(|| {
                metrics::inc_verify_failures();
                MfaError::SessionExpired
            })?;

        let consumed =
            db::recovery_codes::consume_code(&self.redis, nonce.user_id, submitted_code).await?;
        if !consumed {
            metrics::inc_verify_failures();
            return Err(MfaError::InvalidRecoveryCode);
        }

        if !db::nonces::consume(&self.db, nonce.id).await? {
            tracing::warn!(
                "Nonce consumed concurrently during recovery for user: {}",
                nonce.user_id
            );
            metrics::inc_verify_failures();
            return Err(MfaError::SessionExpired);
        }

        let remaining = db::recovery_codes::remaining(&self.redis, nonce.user_id).await?;
        db::two_factor::touch_last_verified(&self.db, nonce.user_id).await?;
        metrics::inc_verify_success();
        metrics::inc_recovery_consumed();
        tracing::info!(
            "Recovery code accepted for user: {} ({} remaining)",
            nonce.user_id,
            remaining
        );

        Ok(nonce.user_id)
    }
}
