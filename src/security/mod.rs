/// Security primitives for the MFA service
///
/// - **totp**: pure TOTP engine (period derivation, code generation,
///   window validation)
/// - **secret**: enrollment material (shared secrets, provisioning URIs,
///   recovery codes)
/// - **token**: opaque bearer tokens and one-way hashing
pub mod secret;
pub mod token;
pub mod totp;
