/// Device-trust service
///
/// Issues opaque bearer tokens meaning "this device passed the second
/// factor recently", so the factor can be skipped for a bounded period.
/// Trust only ever substitutes for the TOTP/recovery step, never for the
/// primary credential, and is re-checked against the user's enrollment
/// state on every use.
use crate::config::DeviceTrustSettings;
use crate::db;
use crate::error::{MfaError, Result};
use crate::metrics;
use crate::models::{DeviceCheck, DeviceContext, TrustedDevice};
use crate::security::token::{generate_device_token, hash_token};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Device-trust service
#[derive(Clone)]
pub struct DeviceTrustService {
    db: PgPool,
    policy: DeviceTrustSettings,
}

impl DeviceTrustService {
    pub fn new(db: PgPool, policy: DeviceTrustSettings) -> Self {
        Self { db, policy }
    }

    pub fn policy(&self) -> &DeviceTrustSettings {
        &self.policy
    }

    /// Issue a trust grant for a device that just passed verification.
    ///
    /// Returns the raw token exactly once; only its hash is stored. The
    /// caller puts it in an HttpOnly, Secure, SameSite cookie.
    pub async fn trust(
        &self,
        user_id: Uuid,
        context: &DeviceContext,
    ) -> Result<(String, TrustedDevice)> {
        let raw_token = generate_device_token();
        let token_hash = hash_token(&raw_token);
        let expires_at = Utc::now() + Duration::days(self.policy.ttl_days);

        let device =
            db::trusted_devices::insert_device(&self.db, user_id, &token_hash, context, expires_at)
                .await?;

        tracing::info!(
            "Device trust granted for user: {} (device: {})",
            user_id,
            device.id
        );

        Ok((raw_token, device))
    }

    /// Check a presented trust token.
    ///
    /// A live grant updates its activity trail and reports whether it has
    /// aged past the rotation threshold. Revoked, expired and unknown
    /// tokens fail with distinct kinds; a grant for a user whose 2FA is
    /// no longer enabled is revoked on sight.
    pub async fn check(
        &self,
        raw_token: &str,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<DeviceCheck> {
        metrics::inc_device_checks();

        let token_hash = hash_token(raw_token);
        let device = db::trusted_devices::find_by_token_hash(&self.db, &token_hash)
            .await?
            .ok_or(MfaError::DeviceNotFound)?;

        if device.revoked {
            return Err(MfaError::DeviceRevoked);
        }

        let now = Utc::now();
        if device.is_expired(now) {
            return Err(MfaError::DeviceExpired);
        }

        let settings = db::two_factor::get_settings(&self.db, device.user_id).await?;
        if !settings.map(|s| s.is_active()).unwrap_or(false) {
            db::trusted_devices::revoke(
                &self.db,
                device.id,
                device.user_id,
                Some("two_factor_disabled"),
            )
            .await?;
            return Err(MfaError::DeviceRevoked);
        }

        db::trusted_devices::touch(&self.db, device.id, ip_address, user_agent).await?;

        Ok(DeviceCheck {
            valid: true,
            needs_rotation: device.needs_rotation(now, self.policy.rotation_after_days),
            user_id: device.user_id,
            device_id: device.id,
        })
    }

    /// Rotate a trust grant: revoke the old token and issue a fresh one
    /// in a single transaction, so a stolen old token dies the moment
    /// rotation lands and a crash can never leave both live.
    pub async fn rotate(
        &self,
        raw_old_token: &str,
        context: &DeviceContext,
    ) -> Result<(String, TrustedDevice)> {
        let old_hash = hash_token(raw_old_token);
        let old = db::trusted_devices::find_by_token_hash(&self.db, &old_hash)
            .await?
            .ok_or(MfaError::DeviceNotFound)?;

        if old.revoked {
            return Err(MfaError::DeviceRevoked);
        }
        if old.is_expired(Utc::now()) {
            return Err(MfaError::DeviceExpired);
        }

        let raw_token = generate_device_token();
        let new_hash = hash_token(&raw_token);
        let expires_at = Utc::now() + Duration::days(self.policy.ttl_days);

        let device = db::trusted_devices::rotate(
            &self.db,
            old.user_id,
            &old_hash,
            &new_hash,
            context,
            expires_at,
        )
        .await?
        // The conditional revoke lost to a concurrent rotation
        .ok_or(MfaError::DeviceRevoked)?;

        metrics::inc_device_rotations();
        tracing::info!(
            "Device trust rotated for user: {} ({} -> {})",
            old.user_id,
            old.id,
            device.id
        );

        Ok((raw_token, device))
    }

    /// Revoke one grant on user request. Idempotent.
    pub async fn revoke(&self, device_id: Uuid, user_id: Uuid, reason: Option<&str>) -> Result<()> {
        db::trusted_devices::revoke(&self.db, device_id, user_id, reason).await?;
        tracing::info!("Device trust revoked for user: {} (device: {})", user_id, device_id);
        Ok(())
    }

    /// List a user's live grants for the settings UI.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<TrustedDevice>> {
        db::trusted_devices::list_active(&self.db, user_id).await
    }
}
