use sha2::{Digest, Sha256};

/// Hex characters kept from the digest.
const HASH_LEN: usize = 24;

/// Salted, truncated SHA-256 of a client identity (IP or email).
pub fn hash_identity(salt: &str, value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(value.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(HASH_LEN);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_and_truncated() {
        let a = hash_identity("salt", "203.0.113.7");
        let b = hash_identity("salt", "203.0.113.7");
        assert_eq!(a, b);
        assert_eq!(a.len(), HASH_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_salt_changes_hash() {
        assert_ne!(
            hash_identity("one", "user@example.com"),
            hash_identity("two", "user@example.com")
        );
    }
}
