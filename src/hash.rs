//! Content hashing.
//!
//! A single pure primitive fingerprints both the original upload and every
//! finalized artifact. Any byte change (re-embedding, re-composing, signing)
//! requires recomputing and replacing the stored hash.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 digest of `bytes` as a lowercase hex string.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let a = sha256_hex(b"original document bytes");
        let b = sha256_hex(b"original document bytes");
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_known_vector() {
        // SHA-256 of the empty input
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_differs_for_different_bytes() {
        let corpus: &[&[u8]] = &[
            b"",
            b"a",
            b"b",
            b"ab",
            b"%PDF-1.7",
            b"%PDF-1.7 ",
            &[0u8; 64],
            &[1u8; 64],
        ];
        for (i, x) in corpus.iter().enumerate() {
            for (j, y) in corpus.iter().enumerate() {
                if i != j {
                    assert_ne!(sha256_hex(x), sha256_hex(y));
                }
            }
        }
    }

    #[test]
    fn test_hash_format() {
        let digest = sha256_hex(b"abc");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, digest.to_lowercase());
    }
}
