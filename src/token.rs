//! Signer access tokens.
//!
//! A signer is identified solely by a single-use capability token; there is
//! no other identity check. Tokens therefore carry at least 256 bits of
//! entropy from the operating system RNG.

use rand::rngs::OsRng;
use rand::RngCore;

/// Number of random bytes in an access token.
pub const ACCESS_TOKEN_BYTES: usize = 32;

/// Generate a fresh signer access token: 32 OS-random bytes, hex-encoded.
pub fn generate_access_token() -> String {
    let mut secret = [0u8; ACCESS_TOKEN_BYTES];
    OsRng.fill_bytes(&mut secret);
    hex::encode(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_length_and_charset() {
        let token = generate_access_token();
        assert_eq!(token.len(), ACCESS_TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tokens_are_unique() {
        let tokens: HashSet<String> = (0..256).map(|_| generate_access_token()).collect();
        assert_eq!(tokens.len(), 256);
    }
}
