/// Enrollment material: shared secrets, provisioning URIs, recovery codes
///
/// Generation only; nothing here persists anything. Persistence happens
/// when the user proves possession during enrollment confirmation.
use base32::Alphabet;
use rand::Rng;

use crate::error::{MfaError, Result};

/// Shared-secret length in bytes (160 bits, RFC 4226 minimum)
const SECRET_LEN: usize = 20;

/// Number of single-use recovery codes issued per enrollment
pub const RECOVERY_CODE_COUNT: usize = 10;

/// Recovery-code length. Eight characters of A-Z0-9 is ~41 bits.
const RECOVERY_CODE_LEN: usize = 8;

const RECOVERY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a new shared secret, base32-encoded (RFC 4648, no padding).
pub fn generate_secret() -> String {
    let mut rng = rand::thread_rng();
    let mut bytes = [0u8; SECRET_LEN];
    rng.fill(&mut bytes);

    base32::encode(Alphabet::Rfc4648 { padding: false }, &bytes)
}

/// Decode a base32 shared secret back to raw bytes.
pub fn decode_secret(secret: &str) -> Result<Vec<u8>> {
    base32::decode(Alphabet::Rfc4648 { padding: false }, secret)
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| MfaError::Validation("Invalid base32 secret".to_string()))
}

/// Build the otpauth:// provisioning URI for authenticator apps.
///
/// Format: otpauth://totp/Issuer:account?secret=...&issuer=...&algorithm=SHA1&digits=N&period=N
pub fn provisioning_uri(
    issuer: &str,
    account_label: &str,
    secret: &str,
    digits: u32,
    step_secs: u64,
) -> String {
    format!(
        "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
        urlencoding::encode(issuer),
        urlencoding::encode(account_label),
        secret,
        urlencoding::encode(issuer),
        digits,
        step_secs
    )
}

/// Render a provisioning URI as an SVG QR code for the enrollment screen.
pub fn qr_code_svg(uri: &str) -> Result<String> {
    let code = qrcode::QrCode::new(uri)
        .map_err(|e| MfaError::Internal(format!("Failed to generate QR code: {}", e)))?;

    Ok(code.render::<qrcode::render::svg::Color>().build())
}

/// Generate the recovery-code set for an enrollment.
///
/// Codes are uppercase alphanumeric so they survive case-insensitive
/// entry; matching normalizes before hashing.
pub fn generate_recovery_codes() -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..RECOVERY_CODE_COUNT)
        .map(|_| {
            (0..RECOVERY_CODE_LEN)
                .map(|_| {
                    let idx = rng.gen_range(0..RECOVERY_ALPHABET.len());
                    RECOVERY_ALPHABET[idx] as char
                })
                .collect()
        })
        .collect()
}

/// Normalize a submitted recovery code for comparison.
pub fn normalize_recovery_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_secret_round_trips() {
        let secret = generate_secret();
        let bytes = decode_secret(&secret).unwrap();
        assert_eq!(bytes.len(), SECRET_LEN);
    }

    #[test]
    fn test_secrets_are_unique() {
        assert_ne!(generate_secret(), generate_secret());
    }

    #[test]
    fn test_decode_rejects_invalid_base32() {
        assert!(decode_secret("not base32!").is_err());
        assert!(decode_secret("").is_err());
    }

    #[test]
    fn test_provisioning_uri_format() {
        let uri = provisioning_uri("Atrium", "user@example.com", "JBSWY3DPEHPK3PXP", 6, 30);

        assert!(uri.starts_with("otpauth://totp/Atrium:"));
        assert!(uri.contains("secret=JBSWY3DPEHPK3PXP"));
        assert!(uri.contains("issuer=Atrium"));
        assert!(uri.contains("digits=6"));
        assert!(uri.contains("period=30"));
        // Label must be percent-encoded per the otpauth spec
        assert!(uri.contains("user%40example.com"));
    }

    #[test]
    fn test_generate_recovery_codes() {
        let codes = generate_recovery_codes();
        assert_eq!(codes.len(), RECOVERY_CODE_COUNT);
        for code in &codes {
            assert_eq!(code.len(), 8);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_normalize_recovery_code() {
        assert_eq!(normalize_recovery_code(" ab12cd34 "), "AB12CD34");
        assert_eq!(normalize_recovery_code("EF56GH78"), "EF56GH78");
    }

    #[test]
    fn test_qr_code_svg() {
        let uri = provisioning_uri("Atrium", "user@example.com", "JBSWY3DPEHPK3PXP", 6, 30);
        let svg = qr_code_svg(&uri).unwrap();
        assert!(svg.contains("<svg"));
    }
}
