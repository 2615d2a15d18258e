/// MFA Service Library
///
/// Second-factor (TOTP) verification and device trust for the Atrium
/// platform. The service sits behind the gateway: primary-credential
/// checks happen upstream, and this crate owns everything from "the
/// password was right" to "the second factor is satisfied".
///
/// ## Modules
///
/// - `config`: Service configuration and protocol policy
/// - `db`: Storage repositories (settings, nonces, claims, devices, recovery codes)
/// - `error`: Error taxonomy
/// - `http`: HTTP API for the gateway
/// - `metrics`: Prometheus counters
/// - `models`: Data models
/// - `security`: TOTP engine, enrollment material, bearer tokens
/// - `services`: Business logic (enrollment, verification, device trust)
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod metrics;
pub mod models;
pub mod security;
pub mod services;

// Re-export commonly used types
pub use error::{MfaError, Result};
pub use http::AppState;
