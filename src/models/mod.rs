/// Data models for the MFA service
pub mod device;
pub mod nonce;
pub mod two_factor;

// Re-export commonly used types
pub use device::{DeviceCheck, DeviceContext, DeviceSummary, TrustedDevice};
pub use nonce::VerificationNonce;
pub use two_factor::{EnrollmentStart, TwoFactorSettings};
