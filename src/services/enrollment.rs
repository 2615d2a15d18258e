/// Enrollment service (TOTP provisioning)
use crate::config::TotpSettings;
use crate::db;
use crate::error::{MfaError, Result};
use crate::metrics;
use crate::models::EnrollmentStart;
use crate::security::{secret, totp};
use chrono::Utc;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use uuid::Uuid;

/// Enrollment service
#[derive(Clone)]
pub struct EnrollmentService {
    db: PgPool,
    redis: ConnectionManager,
    totp: TotpSettings,
}

impl EnrollmentService {
    pub fn new(db: PgPool, redis: ConnectionManager, totp: TotpSettings) -> Self {
        Self { db, redis, totp }
    }

    /// Begin TOTP enrollment for a user.
    ///
    /// Generates the shared secret, provisioning URI, QR artifact and
    /// recovery codes, and returns them to the enrollment screen.
    /// Nothing is persisted: an abandoned enrollment leaves no state.
    pub async fn begin_enrollment(
        &self,
        user_id: Uuid,
        account_label: &str,
    ) -> Result<EnrollmentStart> {
        if let Some(settings) = db::two_factor::get_settings(&self.db, user_id).await? {
            if settings.is_active() {
                return Err(MfaError::AlreadyEnrolled);
            }
        }

        let shared_secret = secret::generate_secret();
        let provisioning_uri = secret::provisioning_uri(
            &self.totp.issuer,
            account_label,
            &shared_secret,
            self.totp.digits,
            self.totp.step_secs,
        );
        let qr_svg = secret::qr_code_svg(&provisioning_uri)?;
        let recovery_codes = secret::generate_recovery_codes();

        tracing::info!("Enrollment material issued for user: {}", user_id);

        Ok(EnrollmentStart {
            secret: shared_secret,
            provisioning_uri,
            qr_svg,
            recovery_codes,
        })
    }

    /// Confirm enrollment by proving possession of the device.
    ///
    /// Validates the submitted code against the candidate secret; only on
    /// success does anything persist. Trust grants issued before 2FA was
    /// enabled must not bypass it afterward, so every existing grant is
    /// revoked in the same step.
    pub async fn confirm_enrollment(
        &self,
        user_id: Uuid,
        shared_secret: &str,
        recovery_codes: &[String],
        submitted_code: &str,
    ) -> Result<()> {
        let secret_bytes = secret::decode_secret(shared_secret)
            .map_err(|_| MfaError::Validation("Malformed shared secret".to_string()))?;

        let now = Utc::now().timestamp() as u64;
        let matched = totp::validate(
            &secret_bytes,
            submitted_code,
            now,
            self.totp.step_secs,
            self.totp.digits,
            self.totp.skew_window,
        );

        if matched.is_none() {
            return Err(MfaError::InvalidCode);
        }

        db::two_factor::enable(&self.db, user_id, shared_secret).await?;
        db::recovery_codes::replace_codes(&self.redis, user_id, recovery_codes).await?;

        let revoked =
            db::trusted_devices::revoke_all_for_user(&self.db, user_id, "two_factor_enabled")
                .await?;
        if revoked > 0 {
            tracing::info!(
                "Revoked {} pre-enrollment trust grants for user: {}",
                revoked,
                user_id
            );
        }

        metrics::inc_enrollments();
        tracing::info!("Two-factor authentication enabled for user: {}", user_id);
        Ok(())
    }

    /// Disable two-factor authentication.
    ///
    /// Clears the shared secret and recovery codes, and revokes every
    /// trusted device so nothing keeps skipping a factor that no longer
    /// exists.
    pub async fn disable(&self, user_id: Uuid) -> Result<()> {
        db::two_factor::disable(&self.db, user_id).await?;
        db::recovery_codes::clear_codes(&self.redis, user_id).await?;
        db::trusted_devices::revoke_all_for_user(&self.db, user_id, "two_factor_disabled").await?;

        tracing::info!("Two-factor authentication disabled for user: {}", user_id);
        Ok(())
    }
}
