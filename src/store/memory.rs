//! In-memory store implementations.
//!
//! A single mutex per store keeps every check-and-mutate sequence atomic,
//! which is what makes [`MemoryStore::claim_finalization`] race-free. These
//! are the reference implementations for tests and non-durable embedders.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Document, DocumentStatus, SignatureField, Signer, SignerStatus};
use crate::error::{Error, Result};
use crate::store::{BlobStore, FieldStore, NotificationDispatcher, WorkflowStore};

#[derive(Default)]
struct DocumentsInner {
    documents: HashMap<Uuid, Document>,
    finalize_claims: HashMap<Uuid, bool>,
    // Insertion order doubles as document order for signers.
    signers: Vec<Signer>,
}

/// Mutex-guarded document/signer store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<DocumentsInner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, DocumentsInner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Storage("document store poisoned".to_string()))
    }
}

impl WorkflowStore for MemoryStore {
    fn insert_document(&self, document: Document) -> Result<()> {
        let mut inner = self.lock()?;
        inner.finalize_claims.insert(document.id, false);
        inner.documents.insert(document.id, document);
        Ok(())
    }

    fn find_document(&self, id: Uuid) -> Result<Document> {
        self.lock()?
            .documents
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound("document".to_string()))
    }

    fn update_document(&self, document: &Document) -> Result<()> {
        let mut inner = self.lock()?;
        let existing = inner
            .documents
            .get_mut(&document.id)
            .ok_or_else(|| Error::NotFound("document".to_string()))?;
        let mut updated = document.clone();
        updated.version = existing.version + 1;
        *existing = updated;
        Ok(())
    }

    fn insert_signer(&self, signer: Signer) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.signers.iter().any(|s| s.access_token == signer.access_token) {
            return Err(Error::InvalidState("access token already in use".to_string()));
        }
        inner.signers.push(signer);
        Ok(())
    }

    fn update_signer(&self, signer: &Signer) -> Result<()> {
        let mut inner = self.lock()?;
        let existing = inner
            .signers
            .iter_mut()
            .find(|s| s.id == signer.id)
            .ok_or_else(|| Error::NotFound("signer".to_string()))?;
        *existing = signer.clone();
        Ok(())
    }

    fn mark_signed(&self, signer: &Signer) -> Result<()> {
        let mut inner = self.lock()?;
        let existing = inner
            .signers
            .iter_mut()
            .find(|s| s.id == signer.id)
            .ok_or_else(|| Error::NotFound("signer".to_string()))?;
        // Check and write under the same lock.
        if existing.status != SignerStatus::Pending {
            return Err(Error::InvalidState("signature already recorded".to_string()));
        }
        *existing = signer.clone();
        Ok(())
    }

    fn find_signer_by_token(&self, token: &str) -> Result<Signer> {
        self.lock()?
            .signers
            .iter()
            .find(|s| s.access_token == token)
            .cloned()
            .ok_or_else(|| Error::NotFound("signer".to_string()))
    }

    fn signers_for_document(&self, document_id: Uuid) -> Result<Vec<Signer>> {
        Ok(self
            .lock()?
            .signers
            .iter()
            .filter(|s| s.document_id == document_id)
            .cloned()
            .collect())
    }

    fn claim_finalization(&self, document_id: Uuid) -> Result<bool> {
        let mut inner = self.lock()?;
        let status = inner
            .documents
            .get(&document_id)
            .map(|d| d.status)
            .ok_or_else(|| Error::NotFound("document".to_string()))?;
        if status != DocumentStatus::PendingSignatures {
            return Ok(false);
        }
        let claimed = inner.finalize_claims.entry(document_id).or_insert(false);
        if *claimed {
            Ok(false)
        } else {
            *claimed = true;
            Ok(true)
        }
    }

    fn is_finalization_claimed(&self, document_id: Uuid) -> Result<bool> {
        Ok(self.lock()?.finalize_claims.get(&document_id).copied().unwrap_or(false))
    }

    fn record_completion(&self, document_id: Uuid, final_key: &str, final_hash: &str) -> Result<()> {
        let mut inner = self.lock()?;
        let document = inner
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| Error::NotFound("document".to_string()))?;
        document.status = DocumentStatus::Completed;
        document.final_key = Some(final_key.to_string());
        document.final_hash = Some(final_hash.to_string());
        document.version += 1;
        Ok(())
    }

    fn mark_expired(&self, document_id: Uuid) -> Result<()> {
        let mut inner = self.lock()?;
        let document = inner
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| Error::NotFound("document".to_string()))?;
        document.status = DocumentStatus::Expired;
        document.version += 1;
        Ok(())
    }

    fn documents_past_expiry(&self, now: DateTime<Utc>) -> Result<Vec<Document>> {
        Ok(self
            .lock()?
            .documents
            .values()
            .filter(|d| d.status == DocumentStatus::PendingSignatures && d.is_expired_at(now))
            .cloned()
            .collect())
    }

    fn pending_documents(&self) -> Result<Vec<Document>> {
        Ok(self
            .lock()?
            .documents
            .values()
            .filter(|d| d.status == DocumentStatus::PendingSignatures)
            .cloned()
            .collect())
    }
}

/// Mutex-guarded field store.
#[derive(Default)]
pub struct MemoryFieldStore {
    fields: Mutex<Vec<SignatureField>>,
}

impl MemoryFieldStore {
    /// Create an empty field store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field. Fields are normally created by the envelope subsystem.
    pub fn insert(&self, field: SignatureField) {
        if let Ok(mut fields) = self.fields.lock() {
            fields.push(field);
        }
    }
}

impl FieldStore for MemoryFieldStore {
    fn fields_for_document(&self, document_id: Uuid) -> Result<Vec<SignatureField>> {
        let fields = self
            .fields
            .lock()
            .map_err(|_| Error::Storage("field store poisoned".to_string()))?;
        Ok(fields.iter().filter(|f| f.document_id == document_id).cloned().collect())
    }

    fn save_value(&self, field_id: Uuid, value: &str) -> Result<()> {
        let mut fields = self
            .fields
            .lock()
            .map_err(|_| Error::Storage("field store poisoned".to_string()))?;
        let field = fields
            .iter_mut()
            .find(|f| f.id == field_id)
            .ok_or_else(|| Error::NotFound("field".to_string()))?;
        field.value = Some(value.to_string());
        Ok(())
    }
}

/// Mutex-guarded blob store with a failure toggle for retry tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, (Vec<u8>, String)>>,
    fail_puts: AtomicBool,
}

impl MemoryBlobStore {
    /// Create an empty blob store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put` fail with a transient storage error.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Whether a blob exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.blobs.lock().map(|b| b.contains_key(key)).unwrap_or(false)
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| Error::Storage("blob store poisoned".to_string()))?;
        blobs
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| Error::Storage(format!("blob unavailable: {}", key)))
    }

    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Error::Storage("blob write failed".to_string()));
        }
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| Error::Storage("blob store poisoned".to_string()))?;
        blobs.insert(key.to_string(), (bytes.to_vec(), content_type.to_string()));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| Error::Storage("blob store poisoned".to_string()))?;
        blobs.remove(key);
        Ok(())
    }
}

/// Dispatcher that records every invite and reminder.
#[derive(Default)]
pub struct MemoryDispatcher {
    invites: Mutex<Vec<(Uuid, Uuid)>>,
    reminders: Mutex<Vec<(Uuid, Uuid)>>,
}

impl MemoryDispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// `(document_id, signer_id)` pairs of all invites sent so far.
    pub fn invites(&self) -> Vec<(Uuid, Uuid)> {
        self.invites.lock().map(|i| i.clone()).unwrap_or_default()
    }

    /// `(document_id, signer_id)` pairs of all reminders sent so far.
    pub fn reminders(&self) -> Vec<(Uuid, Uuid)> {
        self.reminders.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl NotificationDispatcher for MemoryDispatcher {
    fn send_signing_invite(&self, document: &Document, signer: &Signer) {
        log::debug!("dispatching signing invite for document {} to {}", document.id, signer.email);
        if let Ok(mut invites) = self.invites.lock() {
            invites.push((document.id, signer.id));
        }
    }

    fn send_reminder(&self, document: &Document, signer: &Signer) {
        log::debug!("dispatching reminder for document {} to {}", document.id, signer.email);
        if let Ok(mut reminders) = self.reminders.lock() {
            reminders.push((document.id, signer.id));
        }
    }
}
