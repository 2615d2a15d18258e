//! Configuration management for the MFA service
//!
//! Loads settings from:
//! 1. Environment variables
//! 2. .env file (local development)
//!
//! Protocol policy knobs (TOTP skew window, nonce TTL, device-trust
//! lifetime and rotation threshold) are configuration, not constants.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::info;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub server: ServerSettings,
    pub totp: TotpSettings,
    pub nonce: NonceSettings,
    pub device_trust: DeviceTrustSettings,
}

impl Settings {
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }

        Ok(Settings {
            database: DatabaseSettings::from_env()?,
            redis: RedisSettings::from_env()?,
            server: ServerSettings::from_env()?,
            totp: TotpSettings::from_env()?,
            nonce: NonceSettings::from_env()?,
            device_trust: DeviceTrustSettings::from_env()?,
        })
    }
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: u64,
}

impl DatabaseSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
            acquire_timeout: env::var("DATABASE_ACQUIRE_TIMEOUT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid DATABASE_ACQUIRE_TIMEOUT")?,
        })
    }
}

/// Redis settings (recovery-code store)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

impl RedisSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("REDIS_URL").context("REDIS_URL must be set")?,
        })
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Shared key callers must present in X-Internal-API-Key
    pub internal_api_key: Option<String>,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8086".to_string())
                .parse()
                .context("Invalid SERVER_PORT")?,
            internal_api_key: env::var("INTERNAL_API_KEY").ok(),
        })
    }
}

/// TOTP protocol settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotpSettings {
    /// Issuer shown in authenticator apps
    pub issuer: String,
    /// Time step in seconds (standard: 30)
    pub step_secs: u64,
    /// Code length in digits (standard: 6)
    pub digits: u32,
    /// Accepted clock drift, in periods either side of now
    pub skew_window: i64,
}

impl TotpSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            issuer: env::var("TOTP_ISSUER").unwrap_or_else(|_| "Atrium".to_string()),
            step_secs: env::var("TOTP_STEP_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid TOTP_STEP_SECS")?,
            digits: env::var("TOTP_DIGITS")
                .unwrap_or_else(|_| "6".to_string())
                .parse()
                .context("Invalid TOTP_DIGITS")?,
            skew_window: env::var("TOTP_SKEW_WINDOW")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("Invalid TOTP_SKEW_WINDOW")?,
        })
    }
}

/// Verification-nonce settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceSettings {
    /// Nonce lifetime in seconds (minutes, not hours)
    pub ttl_secs: i64,
}

impl NonceSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            ttl_secs: env::var("NONCE_TTL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("Invalid NONCE_TTL_SECS")?,
        })
    }
}

/// Device-trust policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTrustSettings {
    /// How long a trust grant remains valid
    pub ttl_days: i64,
    /// Age after which check() asks the caller to rotate the token
    pub rotation_after_days: i64,
    /// Cookie name the HTTP layer issues and reads
    pub cookie_name: String,
}

impl DeviceTrustSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            ttl_days: env::var("DEVICE_TRUST_TTL_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid DEVICE_TRUST_TTL_DAYS")?,
            rotation_after_days: env::var("DEVICE_TRUST_ROTATION_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .context("Invalid DEVICE_TRUST_ROTATION_DAYS")?,
            cookie_name: env::var("DEVICE_TRUST_COOKIE")
                .unwrap_or_else(|_| "atrium_device_trust".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_totp_settings_defaults() {
        env::remove_var("TOTP_ISSUER");
        env::remove_var("TOTP_STEP_SECS");
        env::remove_var("TOTP_DIGITS");
        env::remove_var("TOTP_SKEW_WINDOW");

        let settings = TotpSettings::from_env().unwrap();

        assert_eq!(settings.step_secs, 30);
        assert_eq!(settings.digits, 6);
        assert_eq!(settings.skew_window, 2);
    }

    #[test]
    #[serial]
    fn test_device_trust_settings_from_env() {
        env::set_var("DEVICE_TRUST_TTL_DAYS", "14");
        env::set_var("DEVICE_TRUST_ROTATION_DAYS", "3");

        let settings = DeviceTrustSettings::from_env().unwrap();

        assert_eq!(settings.ttl_days, 14);
        assert_eq!(settings.rotation_after_days, 3);

        env::remove_var("DEVICE_TRUST_TTL_DAYS");
        env::remove_var("DEVICE_TRUST_ROTATION_DAYS");
    }

    #[test]
    #[serial]
    fn test_nonce_ttl_default_is_minutes_not_hours() {
        env::remove_var("NONCE_TTL_SECS");

        let settings = NonceSettings::from_env().unwrap();

        assert_eq!(settings.ttl_secs, 300);
    }
}
