//! The finalization pipeline: original bytes in, signed artifact out.
//!
//! Steps run synchronously in order: fetch the original, burn captured
//! field values in, append the evidence page(s), apply the tenant's
//! signature, then persist the result with its fingerprint. Everything but
//! the evidence timestamp is deterministic, so a failed run can simply be
//! repeated.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::cert::ArtifactSigner;
use crate::domain::{Document, Signer};
use crate::error::Result;
use crate::hash::sha256_hex;
use crate::pdf::{EvidencePageComposer, FieldEmbedder};
use crate::store::{BlobStore, FieldStore};

/// Where and what the pipeline produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedArtifact {
    /// Blob key of the signed artifact.
    pub key: String,
    /// SHA-256 hex of the signed artifact.
    pub sha256: String,
}

/// Produces the final signed artifact for a completed document.
pub struct FinalizationPipeline {
    blobs: Arc<dyn BlobStore>,
    fields: Arc<dyn FieldStore>,
    signer: Arc<dyn ArtifactSigner>,
    embedder: FieldEmbedder,
    composer: EvidencePageComposer,
}

impl FinalizationPipeline {
    /// Create a pipeline with the default embedder and an English evidence
    /// page.
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        fields: Arc<dyn FieldStore>,
        signer: Arc<dyn ArtifactSigner>,
    ) -> Self {
        Self {
            blobs,
            fields,
            signer,
            embedder: FieldEmbedder::new(),
            composer: EvidencePageComposer::new("en"),
        }
    }

    /// Localize the evidence page.
    pub fn with_language(mut self, language_tag: &str) -> Self {
        self.composer = EvidencePageComposer::new(language_tag);
        self
    }

    /// Blob key the finalized artifact is stored under.
    pub fn final_key(document_id: Uuid) -> String {
        format!("final/{}.pdf", document_id)
    }

    /// Run the full pipeline for `document`.
    ///
    /// Blob failures come back as transient [`Storage`](crate::Error::Storage)
    /// errors; nothing before the final `put` mutates shared state, so the
    /// caller may retry the whole run.
    pub fn run(&self, document: &Document, signers: &[Signer]) -> Result<FinalizedArtifact> {
        let original = self.blobs.get(&document.original_key)?;
        let fields = self.fields.fields_for_document(document.id)?;

        let embedded = self.embedder.embed(&original, &fields)?;
        let with_evidence = self.composer.append(&embedded, document, signers, Utc::now())?;
        let signed = self.signer.sign(document.tenant_id, &with_evidence)?;

        let key = Self::final_key(document.id);
        let sha256 = sha256_hex(&signed);
        self.blobs.put(&key, &signed, "application/pdf")?;
        log::info!("finalized document {} as {} ({})", document.id, key, sha256);
        Ok(FinalizedArtifact { key, sha256 })
    }
}
