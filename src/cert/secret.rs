//! AES-256-GCM encryption for certificate passphrases at rest.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An encrypted passphrase, safe to persist alongside the certificate.
///
/// The nonce is fresh per encryption; the pair only decrypts under the key
/// that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedSecret {
    /// Base64 of the 12-byte GCM nonce.
    pub nonce_b64: String,
    /// Base64 of ciphertext plus tag.
    pub ciphertext_b64: String,
}

/// Symmetric cipher wrapping a 256-bit master key.
///
/// Failures are reported without detail on purpose: error text from this
/// module may end up in logs, and must not leak anything about the key or
/// the plaintext.
#[derive(Clone)]
pub struct SecretCipher {
    key: [u8; 32],
}

impl SecretCipher {
    /// Wrap an explicit 256-bit key.
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedSecret> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| Error::Integrity("secret encryption failed".to_string()))?;
        Ok(EncryptedSecret {
            nonce_b64: BASE64.encode(nonce),
            ciphertext_b64: BASE64.encode(ciphertext),
        })
    }

    /// Decrypt a previously encrypted secret.
    pub fn decrypt(&self, secret: &EncryptedSecret) -> Result<Vec<u8>> {
        let tampered = || Error::Integrity("secret decryption failed".to_string());
        let nonce_bytes = BASE64.decode(&secret.nonce_b64).map_err(|_| tampered())?;
        let ciphertext = BASE64.decode(&secret.ciphertext_b64).map_err(|_| tampered())?;
        if nonce_bytes.len() != 12 {
            return Err(tampered());
        }
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|_| tampered())
    }
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").field("key", &"[REDACTED]").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> SecretCipher {
        SecretCipher::new([7u8; 32])
    }

    #[test]
    fn test_round_trip() {
        let secret = cipher().encrypt(b"p12 passphrase").unwrap();
        assert_eq!(cipher().decrypt(&secret).unwrap(), b"p12 passphrase");
    }

    #[test]
    fn test_nonce_is_fresh_per_encryption() {
        let a = cipher().encrypt(b"same").unwrap();
        let b = cipher().encrypt(b"same").unwrap();
        assert_ne!(a.nonce_b64, b.nonce_b64);
        assert_ne!(a.ciphertext_b64, b.ciphertext_b64);
    }

    #[test]
    fn test_wrong_key_fails_opaquely() {
        let secret = cipher().encrypt(b"p12 passphrase").unwrap();
        let err = SecretCipher::new([8u8; 32]).decrypt(&secret).unwrap_err();
        let text = err.to_string();
        assert!(!text.contains("passphrase"));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let mut secret = cipher().encrypt(b"p12 passphrase").unwrap();
        secret.ciphertext_b64 = BASE64.encode(b"garbage garbage");
        assert!(cipher().decrypt(&secret).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        assert!(format!("{:?}", cipher()).contains("[REDACTED]"));
    }
}
