//! # inkseal
//!
//! Core engine for multi-party document signing: the signing workflow
//! state machine and the PDF finalization pipeline behind it.
//!
//! A document starts as a draft, is sent to one or more signers (all at
//! once or in a fixed order), collects signatures through per-signer access
//! tokens, and on the last acceptance is finalized exactly once: captured
//! values are burned into the pages, an audit page is appended, the
//! artifact is optionally sealed with the tenant's certificate and stored
//! with its fingerprint.
//!
//! Persistence, blob storage, notifications and event delivery are trait
//! seams ([`store`], [`domain::events::EventSink`]); in-memory
//! implementations back the tests and embedders that do not need
//! durability.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use inkseal::store::{BlobStore, FieldStore, NotificationDispatcher, WorkflowStore};
//! use inkseal::store::{MemoryBlobStore, MemoryDispatcher, MemoryFieldStore, MemoryStore};
//! use inkseal::domain::events::{EventSink, MemorySink};
//! use inkseal::{
//!     AcceptRequest, Document, FinalizationPipeline, PassthroughSigner, SigningWorkflow,
//! };
//! use uuid::Uuid;
//!
//! # fn main() -> inkseal::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let fields = Arc::new(MemoryFieldStore::new());
//! let blobs = Arc::new(MemoryBlobStore::new());
//! let pipeline = FinalizationPipeline::new(
//!     blobs as Arc<dyn BlobStore>,
//!     Arc::clone(&fields) as Arc<dyn FieldStore>,
//!     Arc::new(PassthroughSigner),
//! );
//! let workflow = SigningWorkflow::new(
//!     store as Arc<dyn WorkflowStore>,
//!     fields as Arc<dyn FieldStore>,
//!     Arc::new(MemoryDispatcher::new()) as Arc<dyn NotificationDispatcher>,
//!     Arc::new(MemorySink::new()) as Arc<dyn EventSink>,
//!     pipeline,
//! );
//!
//! let document = Document::new(Uuid::new_v4(), Uuid::new_v4(), "NDA", "env/doc.pdf");
//! let document_id = document.id;
//! workflow.create_document(document)?;
//! let signer = workflow.add_signer(document_id, "Alice Kim", "alice@example.com", None)?;
//! // ... place fields, then:
//! workflow.send_document(document_id)?;
//! workflow.accept_signature(&AcceptRequest::new(signer.access_token))?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cert;
pub mod domain;
mod error;
mod hash;
pub mod pdf;
mod pipeline;
pub mod store;
mod token;
mod workflow;

pub use cert::{ArtifactSigner, CertificateSigner, CertificateVault, PassthroughSigner, SecretCipher};
pub use domain::{
    Document, DocumentStatus, FieldKind, FieldRect, SignatureField, Signer, SignerStatus,
    SigningMode,
};
pub use error::{Error, Result};
pub use hash::sha256_hex;
pub use pipeline::{FinalizationPipeline, FinalizedArtifact};
pub use token::generate_access_token;
pub use workflow::{AcceptRequest, SigningWorkflow, WorkflowConfig};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
