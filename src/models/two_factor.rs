use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Per-user two-factor state.
///
/// Invariant: `secret` is non-null exactly while `enabled` is true;
/// disabling clears it (and the recovery-code set, which lives in Redis).
#[derive(Debug, Clone, FromRow)]
pub struct TwoFactorSettings {
    pub user_id: Uuid,
    pub enabled: bool,
    pub secret: Option<String>,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TwoFactorSettings {
    /// Whether the second factor is active for this user.
    pub fn is_active(&self) -> bool {
        self.enabled && self.secret.is_some()
    }
}

/// Material returned from `begin_enrollment`; nothing is persisted yet.
#[derive(Debug, Serialize)]
pub struct EnrollmentStart {
    pub secret: String,
    pub provisioning_uri: String,
    pub qr_svg: String,
    pub recovery_codes: Vec<String>,
}

/// Begin-enrollment request
#[derive(Debug, Deserialize, Validate)]
pub struct BeginEnrollmentRequest {
    pub user_id: Uuid,
    /// Account label shown in the authenticator app (usually the email)
    #[validate(length(min = 1, max = 256))]
    pub account_label: String,
}

/// Confirm-enrollment request; carries back the material from begin
#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmEnrollmentRequest {
    pub user_id: Uuid,
    #[validate(length(min = 16, max = 64))]
    pub secret: String,
    #[validate(length(min = 1, max = 20))]
    pub recovery_codes: Vec<String>,
    #[validate(length(min = 6, max = 8))]
    pub code: String,
}

/// Disable request
#[derive(Debug, Deserialize)]
pub struct DisableRequest {
    pub user_id: Uuid,
}

/// Challenge (nonce issuance) request
#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    pub user_id: Uuid,
}

/// Login-time verification request
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyRequest {
    #[validate(length(min = 16, max = 64))]
    pub nonce: String,
    #[validate(length(min = 6, max = 8))]
    pub code: String,
    /// When true, a successful verification also issues a device-trust
    /// token for the presented device metadata
    #[serde(default)]
    pub remember_device: bool,
    pub device_fingerprint: Option<String>,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Recovery-code verification request
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyRecoveryRequest {
    #[validate(length(min = 16, max = 64))]
    pub nonce: String,
    #[validate(length(min = 6, max = 16))]
    pub code: String,
    #[serde(default)]
    pub remember_device: bool,
    pub device_fingerprint: Option<String>,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}
