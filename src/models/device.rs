use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A device-trust grant: "this device passed 2FA recently".
///
/// The raw bearer token is never stored; `token_hash` uniquely identifies
/// one live grant. Rotation revokes the old row and inserts a new one in
/// the same transaction.
#[derive(Debug, Clone, FromRow)]
pub struct TrustedDevice {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub device_fingerprint: Option<String>,
    pub device_name: Option<String>,
    pub first_ip: Option<String>,
    pub last_ip: Option<String>,
    pub last_user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoke_reason: Option<String>,
}

impl TrustedDevice {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the grant has aged past the rotation threshold.
    pub fn needs_rotation(&self, now: DateTime<Utc>, rotation_after_days: i64) -> bool {
        now - self.created_at >= chrono::Duration::days(rotation_after_days)
    }
}

/// Outcome of a device-trust check.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceCheck {
    pub valid: bool,
    pub needs_rotation: bool,
    pub user_id: Uuid,
    pub device_id: Uuid,
}

/// Device metadata presented at trust issuance and on later checks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceContext {
    pub device_fingerprint: Option<String>,
    pub device_name: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Device-check request (token may also arrive via the trust cookie)
#[derive(Debug, Deserialize)]
pub struct CheckDeviceRequest {
    pub token: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Device revocation request
#[derive(Debug, Deserialize)]
pub struct RevokeDeviceRequest {
    pub user_id: Uuid,
    pub reason: Option<String>,
}

/// Device summary for the settings UI
#[derive(Debug, Serialize)]
pub struct DeviceSummary {
    pub id: Uuid,
    pub device_name: Option<String>,
    pub device_fingerprint: Option<String>,
    pub first_ip: Option<String>,
    pub last_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&TrustedDevice> for DeviceSummary {
    fn from(device: &TrustedDevice) -> Self {
        DeviceSummary {
            id: device.id,
            device_name: device.device_name.clone(),
            device_fingerprint: device.device_fingerprint.clone(),
            first_ip: device.first_ip.clone(),
            last_ip: device.last_ip.clone(),
            created_at: device.created_at,
            last_seen_at: device.last_seen_at,
            expires_at: device.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn device(age_days: i64, ttl_days: i64) -> TrustedDevice {
        let now = Utc::now();
        TrustedDevice {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "hash".to_string(),
            device_fingerprint: None,
            device_name: None,
            first_ip: None,
            last_ip: None,
            last_user_agent: None,
            created_at: now - Duration::days(age_days),
            last_seen_at: now,
            expires_at: now - Duration::days(age_days) + Duration::days(ttl_days),
            revoked: false,
            revoked_at: None,
            revoke_reason: None,
        }
    }

    #[test]
    fn test_fresh_grant_needs_no_rotation() {
        let d = device(1, 30);
        assert!(!d.is_expired(Utc::now()));
        assert!(!d.needs_rotation(Utc::now(), 7));
    }

    #[test]
    fn test_aged_grant_needs_rotation_before_expiry() {
        let d = device(10, 30);
        assert!(!d.is_expired(Utc::now()));
        assert!(d.needs_rotation(Utc::now(), 7));
    }

    #[test]
    fn test_expired_grant() {
        let d = device(31, 30);
        assert!(d.is_expired(Utc::now()));
    }
}
