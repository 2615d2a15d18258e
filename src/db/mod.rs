/// Database operations for the MFA service
pub mod nonces;
pub mod period_claims;
pub mod recovery_codes;
pub mod trusted_devices;
pub mod two_factor;

// Re-export commonly used types
pub use nonces::CreateNonceResult;
