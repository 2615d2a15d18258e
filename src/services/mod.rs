/// Business logic for the MFA service
///
/// - `enrollment`: TOTP provisioning (begin/confirm/disable)
/// - `verification`: nonce lifecycle and login-time code checks
/// - `device_trust`: trust-token issue/check/rotate/revoke
pub mod device_trust;
pub mod enrollment;
pub mod verification;

pub use device_trust::DeviceTrustService;
pub use enrollment::EnrollmentService;
pub use verification::VerificationService;
