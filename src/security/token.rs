/// Opaque bearer tokens: generation and one-way hashing
///
/// Raw tokens go to the caller exactly once; only the SHA-256 hash is
/// ever persisted, so a store dump cannot be replayed as a credential.
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

/// Verification-nonce length (before hashing)
const NONCE_LEN: usize = 32;

/// Device-trust token entropy in bytes (hex-encoded on the wire)
const DEVICE_TOKEN_BYTES: usize = 32;

/// Generate a verification-session nonce.
pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

/// Generate a device-trust bearer token (64 hex chars, 256 bits).
pub fn generate_device_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..DEVICE_TOKEN_BYTES).map(|_| rng.gen()).collect();
    hex::encode(bytes)
}

/// Hash a token with SHA-256 for storage and lookup.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_nonce_shape() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), NONCE_LEN);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generate_device_token_shape() {
        let token = generate_device_token();
        assert_eq!(token.len(), DEVICE_TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_token_consistency() {
        let hash1 = hash_token("some_token");
        let hash2 = hash_token("some_token");
        assert_eq!(hash1, hash2);
        // SHA-256 hex is 64 characters
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_hash_token_uniqueness() {
        assert_ne!(hash_token("token1"), hash_token("token2"));
    }
}
