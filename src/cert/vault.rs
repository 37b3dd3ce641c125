//! Installed signing certificates, one per tenant.

use chrono::{DateTime, Utc};
use openssl::asn1::Asn1Time;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::cert::secret::{EncryptedSecret, SecretCipher};
use crate::error::{Error, Result};

/// A stored certificate bundle. The passphrase field is ciphertext only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateRecord {
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Raw PKCS#12 bundle as uploaded.
    pub p12_der: Vec<u8>,
    /// Encrypted bundle passphrase.
    pub passphrase: EncryptedSecret,
    /// Certificate subject common name, when present.
    pub subject: Option<String>,
    /// Certificate issuer common name, when present.
    pub issuer: Option<String>,
    /// Certificate notAfter, as rendered by the parser.
    pub not_after: String,
    /// When the bundle was installed.
    pub installed_at: DateTime<Utc>,
}

/// The secret-free view of an installed certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateMetadata {
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Certificate subject common name, when present.
    pub subject: Option<String>,
    /// Certificate issuer common name, when present.
    pub issuer: Option<String>,
    /// Certificate notAfter, as rendered by the parser.
    pub not_after: String,
    /// When the bundle was installed.
    pub installed_at: DateTime<Utc>,
}

impl From<&CertificateRecord> for CertificateMetadata {
    fn from(record: &CertificateRecord) -> Self {
        Self {
            tenant_id: record.tenant_id,
            subject: record.subject.clone(),
            issuer: record.issuer.clone(),
            not_after: record.not_after.clone(),
            installed_at: record.installed_at,
        }
    }
}

/// Persistence for certificate records, at most one per tenant.
pub trait CertificateStore: Send + Sync {
    /// Insert or replace the tenant's record.
    fn upsert(&self, record: CertificateRecord) -> Result<()>;
    /// Fetch the tenant's record.
    fn find(&self, tenant_id: Uuid) -> Result<Option<CertificateRecord>>;
    /// Remove the tenant's record, reporting whether one existed.
    fn remove(&self, tenant_id: Uuid) -> Result<bool>;
}

/// In-memory [`CertificateStore`].
#[derive(Default)]
pub struct MemoryCertificateStore {
    records: Mutex<Vec<CertificateRecord>>,
}

impl MemoryCertificateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<CertificateRecord>>> {
        self.records
            .lock()
            .map_err(|_| Error::Storage("certificate store lock poisoned".to_string()))
    }
}

impl CertificateStore for MemoryCertificateStore {
    fn upsert(&self, record: CertificateRecord) -> Result<()> {
        let mut records = self.lock()?;
        records.retain(|r| r.tenant_id != record.tenant_id);
        records.push(record);
        Ok(())
    }

    fn find(&self, tenant_id: Uuid) -> Result<Option<CertificateRecord>> {
        Ok(self.lock()?.iter().find(|r| r.tenant_id == tenant_id).cloned())
    }

    fn remove(&self, tenant_id: Uuid) -> Result<bool> {
        let mut records = self.lock()?;
        let before = records.len();
        records.retain(|r| r.tenant_id != tenant_id);
        Ok(records.len() != before)
    }
}

/// Decrypted key material handed to the artifact signer. Never serialized.
pub(crate) struct TenantCredentials {
    pub pkey: PKey<Private>,
    pub cert: X509,
    pub chain: Vec<X509>,
}

/// Install, inspect and remove tenant signing certificates.
pub struct CertificateVault {
    store: Arc<dyn CertificateStore>,
    cipher: SecretCipher,
}

impl CertificateVault {
    /// Create a vault over the given store, encrypting passphrases with
    /// `cipher`.
    pub fn new(store: Arc<dyn CertificateStore>, cipher: SecretCipher) -> Self {
        Self { store, cipher }
    }

    /// Validate and store a PKCS#12 bundle for a tenant.
    ///
    /// The bundle must parse under the given passphrase, contain both a
    /// private key and a certificate, and the certificate must not be
    /// expired. Every parse failure maps to the same generic error so the
    /// response does not reveal whether the bytes or the passphrase were
    /// wrong.
    pub fn install(&self, tenant_id: Uuid, p12_der: &[u8], passphrase: &str) -> Result<CertificateMetadata> {
        let invalid = || Error::Validation("certificate bundle or passphrase is invalid".to_string());

        let parsed = Pkcs12::from_der(p12_der)
            .and_then(|p12| p12.parse2(passphrase))
            .map_err(|_| invalid())?;
        let cert = parsed.cert.ok_or_else(invalid)?;
        if parsed.pkey.is_none() {
            return Err(invalid());
        }

        if is_expired(&cert)? {
            return Err(Error::Validation("certificate is expired".to_string()));
        }

        let record = CertificateRecord {
            tenant_id,
            p12_der: p12_der.to_vec(),
            passphrase: self.cipher.encrypt(passphrase.as_bytes())?,
            subject: common_name(cert.subject_name()),
            issuer: common_name(cert.issuer_name()),
            not_after: cert.not_after().to_string(),
            installed_at: Utc::now(),
        };
        let metadata = CertificateMetadata::from(&record);
        self.store.upsert(record)?;
        log::info!(
            "installed signing certificate for tenant {} (subject {:?}, expires {})",
            tenant_id,
            metadata.subject,
            metadata.not_after
        );
        Ok(metadata)
    }

    /// The secret-free view of the tenant's certificate, if one is installed.
    pub fn metadata(&self, tenant_id: Uuid) -> Result<Option<CertificateMetadata>> {
        Ok(self.store.find(tenant_id)?.as_ref().map(CertificateMetadata::from))
    }

    /// Remove the tenant's certificate, reporting whether one existed.
    pub fn remove(&self, tenant_id: Uuid) -> Result<bool> {
        self.store.remove(tenant_id)
    }

    /// Decrypt and re-parse the tenant's bundle for signing.
    pub(crate) fn credentials(&self, tenant_id: Uuid) -> Result<Option<TenantCredentials>> {
        let record = match self.store.find(tenant_id)? {
            Some(record) => record,
            None => return Ok(None),
        };
        let passphrase_bytes = self.cipher.decrypt(&record.passphrase)?;
        let passphrase = String::from_utf8(passphrase_bytes)
            .map_err(|_| Error::Integrity("stored passphrase is corrupt".to_string()))?;

        let corrupt = || Error::Integrity("stored certificate bundle no longer parses".to_string());
        let parsed = Pkcs12::from_der(&record.p12_der)
            .and_then(|p12| p12.parse2(&passphrase))
            .map_err(|_| corrupt())?;
        let cert = parsed.cert.ok_or_else(corrupt)?;
        let pkey = parsed.pkey.ok_or_else(corrupt)?;
        let chain = parsed.ca.map(|stack| stack.into_iter().collect()).unwrap_or_default();
        Ok(Some(TenantCredentials { pkey, cert, chain }))
    }
}

fn is_expired(cert: &X509) -> Result<bool> {
    let now = Asn1Time::days_from_now(0)
        .map_err(|e| Error::Integrity(format!("clock conversion failed: {}", e)))?;
    let ordering = cert
        .not_after()
        .compare(&now)
        .map_err(|e| Error::Integrity(format!("certificate time comparison failed: {}", e)))?;
    Ok(ordering == Ordering::Less)
}

fn common_name(name: &openssl::x509::X509NameRef) -> Option<String> {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|s| s.to_string())
}
