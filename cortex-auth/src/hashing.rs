//! API key hashing (spec.md §3 `ApiKey` invariant: the raw token is never
//! persisted). Uses `sha2`/`hex`, the teacher's own choice for token
//! hashing (`model-cache/Cargo.toml`).

use rand::RngCore;
use sha2::{Digest, Sha256};

const PREFIX_LEN: usize = 8;

/// Hex-encoded SHA-256 of the raw token — the only form ever written to
/// the registry.
pub fn hash_api_key(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(digest)
}

/// Mints a fresh raw token, its hash, and its non-secret lookup prefix.
/// The raw value is returned once, to the admin API response, and never
/// again (spec.md §3).
pub fn generate_api_key() -> (String, String, String) {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let raw = format!("sk-cortex-{}", hex::encode(bytes));
    let hash = hash_api_key(&raw);
    let prefix = raw.chars().take(PREFIX_LEN + 10).collect::<String>();
    (raw, hash, prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic() {
        assert_eq!(hash_api_key("abc"), hash_api_key("abc"));
        assert_ne!(hash_api_key("abc"), hash_api_key("abd"));
    }

    #[test]
    fn generated_keys_are_unique_and_hash_matches_raw() {
        let (raw1, hash1, _) = generate_api_key();
        let (raw2, hash2, _) = generate_api_key();
        assert_ne!(raw1, raw2);
        assert_eq!(hash_api_key(&raw1), hash1);
        assert_eq!(hash_api_key(&raw2), hash2);
    }

    #[test]
    fn prefix_is_a_non_secret_slice_of_the_raw_token() {
        let (raw, _, prefix) = generate_api_key();
        assert!(raw.starts_with(&prefix));
        assert!(prefix.len() < raw.len());
    }
}
