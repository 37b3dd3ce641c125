//! Ports consumed by the signing core.
//!
//! Persistence, blob storage and notification delivery are external
//! concerns; the workflow talks to them through these traits. The `memory`
//! module provides mutex-guarded implementations used by tests and by
//! embedders that do not need durable storage.

mod memory;

pub use memory::{MemoryBlobStore, MemoryDispatcher, MemoryFieldStore, MemoryStore};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Document, SignatureField, Signer};
use crate::error::Result;

/// Blob storage contract: fetch the original artifact, persist the final one.
pub trait BlobStore: Send + Sync {
    /// Fetch the bytes stored under `key`.
    fn get(&self, key: &str) -> Result<Vec<u8>>;
    /// Store `bytes` under `key` with the given content type.
    fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()>;
    /// Remove the blob stored under `key`.
    fn delete(&self, key: &str) -> Result<()>;
}

/// Access to the signature fields of a document.
pub trait FieldStore: Send + Sync {
    /// All fields placed on the given document.
    fn fields_for_document(&self, document_id: Uuid) -> Result<Vec<SignatureField>>;
    /// Record a captured value for one field.
    fn save_value(&self, field_id: Uuid, value: &str) -> Result<()>;
}

/// Outbound signing invites. Fire-and-forget; failures are the dispatcher's
/// concern and never fail the triggering operation.
pub trait NotificationDispatcher: Send + Sync {
    /// Dispatch the initial signing invite to one signer.
    fn send_signing_invite(&self, document: &Document, signer: &Signer);
    /// Dispatch a reminder to a signer that has not signed yet.
    fn send_reminder(&self, document: &Document, signer: &Signer);
}

/// Document and signer persistence, including the finalization claim.
///
/// `claim_finalization` is the concurrency-critical primitive: it must
/// succeed exactly once per document while the document is
/// `PENDING_SIGNATURES`, no matter how many callers race. A SQL-backed
/// implementation would use a conditional update guarded by the current
/// status; [`MemoryStore`] holds one mutex.
pub trait WorkflowStore: Send + Sync {
    /// Insert a new document record.
    fn insert_document(&self, document: Document) -> Result<()>;
    /// Load a document by id.
    fn find_document(&self, id: Uuid) -> Result<Document>;
    /// Persist document changes, bumping its version.
    fn update_document(&self, document: &Document) -> Result<()>;

    /// Insert a new signer. Rejects a duplicate access token: tokens
    /// uniquely and exclusively identify a signer and are never reused.
    fn insert_signer(&self, signer: Signer) -> Result<()>;
    /// Persist signer changes.
    fn update_signer(&self, signer: &Signer) -> Result<()>;
    /// Persist a signer's `Pending -> Signed` transition atomically: the
    /// write succeeds only while the stored record is still `Pending`, so
    /// exactly one of any number of racing accepts lands. Returns
    /// `InvalidState` for every loser.
    fn mark_signed(&self, signer: &Signer) -> Result<()>;
    /// Resolve a signer by access token.
    fn find_signer_by_token(&self, token: &str) -> Result<Signer>;
    /// All signers of a document, in document order.
    fn signers_for_document(&self, document_id: Uuid) -> Result<Vec<Signer>>;

    /// Atomically claim the right to finalize a document. Returns `true`
    /// for exactly one caller; every other caller, concurrent or later,
    /// gets `false`.
    fn claim_finalization(&self, document_id: Uuid) -> Result<bool>;
    /// Whether the finalization claim has been taken.
    fn is_finalization_claimed(&self, document_id: Uuid) -> Result<bool>;
    /// Record the finalized artifact and flip the document to `COMPLETED`.
    fn record_completion(&self, document_id: Uuid, final_key: &str, final_hash: &str) -> Result<()>;
    /// Flip a document to `EXPIRED`.
    fn mark_expired(&self, document_id: Uuid) -> Result<()>;

    /// Documents in `PENDING_SIGNATURES` whose expiry deadline has passed.
    fn documents_past_expiry(&self, now: DateTime<Utc>) -> Result<Vec<Document>>;
    /// All documents currently in `PENDING_SIGNATURES`.
    fn pending_documents(&self) -> Result<Vec<Document>>;
}
