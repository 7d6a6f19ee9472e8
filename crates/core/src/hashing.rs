//! Shared SHA-256 hex digest utility.
//!
//! Used by the module loader to derive stable module identities from
//! absolute script paths.

use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// First `len` hex characters of [`sha256_hex`].
pub fn short_sha256_hex(data: &[u8], len: usize) -> String {
    let mut hex = sha256_hex(data);
    hex.truncate(len);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_produces_known_hash() {
        let hash = sha256_hex(b"");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn short_hash_is_prefix_of_full_hash() {
        let data = b"/srv/user_scripts/tools/ping.rhai";
        let short = short_sha256_hex(data, 16);
        assert_eq!(short.len(), 16);
        assert!(sha256_hex(data).starts_with(&short));
    }

    #[test]
    fn short_hash_longer_than_digest_is_full_digest() {
        assert_eq!(short_sha256_hex(b"x", 100), sha256_hex(b"x"));
    }
}
