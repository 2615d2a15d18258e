/// TOTP engine (RFC 4226 / RFC 6238)
///
/// Pure function library: derives time periods, computes HMAC-SHA1 codes
/// with dynamic truncation, and validates a candidate against a drift
/// window. No I/O and no clock access; `now_unix` is always a parameter
/// so callers and tests control time.
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::{MfaError, Result};

type HmacSha1 = Hmac<Sha1>;

/// Derive the TOTP period counter from a Unix timestamp.
pub fn derive_period(now_unix: u64, step_secs: u64) -> u64 {
    now_unix / step_secs
}

/// Generate the code for a specific period.
///
/// ## Arguments
///
/// * `secret` - Raw (decoded) shared secret bytes
/// * `period` - Period counter from `derive_period`
/// * `digits` - Code length (standard: 6)
pub fn generate(secret: &[u8], period: u64, digits: u32) -> Result<String> {
    let counter_bytes = period.to_be_bytes();

    let mut mac = HmacSha1::new_from_slice(secret)
        .map_err(|e| MfaError::Internal(format!("Invalid HMAC key: {}", e)))?;
    mac.update(&counter_bytes);
    let hash = mac.finalize().into_bytes();

    // Dynamic truncation (RFC 4226 §5.3)
    let offset = (hash[hash.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        hash[offset] & 0x7f,
        hash[offset + 1],
        hash[offset + 2],
        hash[offset + 3],
    ]);

    let code = binary % 10u32.pow(digits);
    Ok(format!("{:0width$}", code, width = digits as usize))
}

/// Validate a candidate code against the drift window around `now_unix`.
///
/// Scans `[current - window, current + window]` and returns the first
/// period whose code matches, or `None`. Never errors: a malformed
/// candidate or an unusable secret both validate to `None`, so callers
/// can't distinguish failure causes by behavior.
///
/// Comparison is constant-time per candidate period.
pub fn validate(
    secret: &[u8],
    candidate: &str,
    now_unix: u64,
    step_secs: u64,
    digits: u32,
    window: i64,
) -> Option<u64> {
    if candidate.len() != digits as usize || !candidate.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let current = derive_period(now_unix, step_secs) as i64;

    for offset in -window..=window {
        let period = current + offset;
        if period < 0 {
            continue;
        }
        let period = period as u64;

        if let Ok(expected) = generate(secret, period, digits) {
            if constant_time_eq(expected.as_bytes(), candidate.as_bytes()) {
                return Some(period);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6238 Appendix B test secret (ASCII "12345678901234567890")
    const RFC_SECRET: &[u8] = b"12345678901234567890";

    #[test]
    fn test_rfc6238_vectors() {
        // Timestamp 59 -> counter 1 -> 8-digit 94287082
        let period = derive_period(59, 30);
        assert_eq!(period, 1);
        assert_eq!(generate(RFC_SECRET, period, 6).unwrap(), "287082");

        // Timestamp 1111111111 -> counter 37037037 -> 8-digit 14050471
        let period = derive_period(1_111_111_111, 30);
        assert_eq!(generate(RFC_SECRET, period, 6).unwrap(), "050471");

        // Timestamp 2000000000 -> 8-digit 69279037
        let period = derive_period(2_000_000_000, 30);
        assert_eq!(generate(RFC_SECRET, period, 6).unwrap(), "279037");
    }

    #[test]
    fn test_generate_is_deterministic() {
        let a = generate(RFC_SECRET, 12_345, 6).unwrap();
        let b = generate(RFC_SECRET, 12_345, 6).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 6);
    }

    #[test]
    fn test_code_accepted_at_generation_time() {
        let now = 1_700_000_000u64;
        let code = generate(RFC_SECRET, derive_period(now, 30), 6).unwrap();

        let matched = validate(RFC_SECRET, &code, now, 30, 6, 2);
        assert_eq!(matched, Some(derive_period(now, 30)));
    }

    #[test]
    fn test_code_accepted_within_window() {
        let now = 1_700_000_000u64;
        let code = generate(RFC_SECRET, derive_period(now, 30), 6).unwrap();

        // Two periods later the code is still inside a +/-2 window
        assert!(validate(RFC_SECRET, &code, now + 60, 30, 6, 2).is_some());
    }

    #[test]
    fn test_code_rejected_outside_window() {
        let now = 1_700_000_000u64;
        let code = generate(RFC_SECRET, derive_period(now, 30), 6).unwrap();

        // Three periods of drift falls outside a +/-2 window
        assert_eq!(validate(RFC_SECRET, &code, now + 90, 30, 6, 2), None);
        assert_eq!(validate(RFC_SECRET, &code, now - 90, 30, 6, 2), None);
    }

    #[test]
    fn test_malformed_candidates_return_none() {
        let now = 1_700_000_000u64;
        assert_eq!(validate(RFC_SECRET, "12345", now, 30, 6, 2), None);
        assert_eq!(validate(RFC_SECRET, "1234567", now, 30, 6, 2), None);
        assert_eq!(validate(RFC_SECRET, "12a456", now, 30, 6, 2), None);
        assert_eq!(validate(RFC_SECRET, "", now, 30, 6, 2), None);
    }

    #[test]
    fn test_validate_returns_matched_period() {
        let now = 1_700_000_000u64;
        let previous = derive_period(now, 30) - 1;
        let code = generate(RFC_SECRET, previous, 6).unwrap();

        assert_eq!(validate(RFC_SECRET, &code, now, 30, 6, 2), Some(previous));
    }
}
