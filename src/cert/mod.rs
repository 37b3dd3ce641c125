//! Tenant signing certificates: encrypted storage and artifact signing.
//!
//! A tenant installs a PKCS#12 bundle once; its passphrase is held only in
//! AES-256-GCM-encrypted form. Finalization then applies a detached PKCS#7
//! signature to the artifact when a certificate is configured, and passes
//! the artifact through unchanged when none is.

mod secret;
mod signer;
mod vault;

pub use secret::{EncryptedSecret, SecretCipher};
pub use signer::{ArtifactSigner, CertificateSigner, PassthroughSigner};
pub use vault::{
    CertificateMetadata, CertificateRecord, CertificateStore, CertificateVault,
    MemoryCertificateStore,
};
