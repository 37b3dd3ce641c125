//! The signing workflow state machine.
//!
//! One `SigningWorkflow` instance drives every document of a deployment:
//! draft setup, sending, token-based acceptance, finalization, expiry
//! sweeps and reminders. All persistence and delivery goes through the
//! `store` traits; the only cross-signer coordination point is the atomic
//! finalization claim, which guarantees the pipeline runs at most once per
//! document no matter how the last signatures interleave.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::events::{DomainEvent, EventSink};
use crate::domain::{
    Document, DocumentStatus, IdentityVerification, Signer, SignerStatus, SigningMode,
};
use crate::error::{Error, Result};
use crate::hash::sha256_hex;
use crate::pipeline::{FinalizationPipeline, FinalizedArtifact};
use crate::store::{FieldStore, NotificationDispatcher, WorkflowStore};

/// Tunable workflow policy.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Reminders a signer may receive before they stop.
    pub max_reminders: u32,
    /// How long an identity-verification code stays valid.
    pub verification_ttl_minutes: i64,
    /// Failed verification attempts before the challenge locks.
    pub verification_max_attempts: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_reminders: 3,
            verification_ttl_minutes: 10,
            verification_max_attempts: 5,
        }
    }
}

/// A signer's acceptance, as captured by the caller.
#[derive(Debug, Clone)]
pub struct AcceptRequest {
    /// The signer's access token.
    pub token: String,
    /// Whether the signer ticked the consent box. Mandatory.
    pub consent_given: bool,
    /// Captured signature image as a `data:image/...` URL.
    pub signature_data: Option<String>,
    /// Captured `(field_id, value)` pairs for this signer's fields.
    pub field_values: Vec<(Uuid, String)>,
    /// Remote address, for the evidence page.
    pub ip_address: Option<String>,
    /// User agent, for the evidence page.
    pub user_agent: Option<String>,
}

impl AcceptRequest {
    /// A consenting request for the given token with nothing else captured.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            consent_given: true,
            signature_data: None,
            field_values: Vec::new(),
            ip_address: None,
            user_agent: None,
        }
    }
}

/// Orchestrates the signing lifecycle over the store traits.
pub struct SigningWorkflow {
    store: Arc<dyn WorkflowStore>,
    fields: Arc<dyn FieldStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    events: Arc<dyn EventSink>,
    pipeline: FinalizationPipeline,
    config: WorkflowConfig,
}

impl SigningWorkflow {
    /// Create a workflow with the default configuration.
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        fields: Arc<dyn FieldStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        events: Arc<dyn EventSink>,
        pipeline: FinalizationPipeline,
    ) -> Self {
        Self {
            store,
            fields,
            dispatcher,
            events,
            pipeline,
            config: WorkflowConfig::default(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a draft document.
    pub fn create_document(&self, document: Document) -> Result<()> {
        if document.status != DocumentStatus::Draft {
            return Err(Error::InvalidState("new documents start as drafts".to_string()));
        }
        self.store.insert_document(document)
    }

    /// Add a signer to a draft document. `order` is the sequential position
    /// and must be left `None` for parallel documents.
    pub fn add_signer(
        &self,
        document_id: Uuid,
        name: &str,
        email: &str,
        order: Option<u32>,
    ) -> Result<Signer> {
        let document = self.store.find_document(document_id)?;
        if document.status != DocumentStatus::Draft {
            return Err(Error::InvalidState(
                "signers can only be added while the document is a draft".to_string(),
            ));
        }
        let mut signer = Signer::new(&document, name, email);
        signer.order = order;
        self.store.insert_signer(signer.clone())?;
        Ok(signer)
    }

    /// Send a draft out for signing.
    ///
    /// Requires at least one signer and at least one required field; a
    /// sequential document additionally requires every signer to carry a
    /// distinct order. Parallel mode invites everyone at once, sequential
    /// mode only the lowest-order signer.
    pub fn send_document(&self, document_id: Uuid) -> Result<()> {
        let mut document = self.store.find_document(document_id)?;
        if document.status != DocumentStatus::Draft {
            return Err(Error::InvalidState(format!(
                "document is {} and cannot be sent",
                document.status.as_str()
            )));
        }
        if document.is_expired_at(Utc::now()) {
            return Err(Error::InvalidState("signing window has closed".to_string()));
        }

        let signers = self.store.signers_for_document(document_id)?;
        if signers.is_empty() {
            return Err(Error::InvalidState("document has no signers".to_string()));
        }
        let fields = self.fields.fields_for_document(document_id)?;
        if !fields.iter().any(|f| f.required) {
            return Err(Error::InvalidState("document has no required field".to_string()));
        }
        if document.signing_mode == SigningMode::Sequential {
            let mut orders: Vec<u32> = Vec::with_capacity(signers.len());
            for signer in &signers {
                match signer.order {
                    Some(order) if !orders.contains(&order) => orders.push(order),
                    _ => {
                        return Err(Error::InvalidState(
                            "sequential signing requires a distinct order per signer".to_string(),
                        ));
                    },
                }
            }
        }

        document.status = DocumentStatus::PendingSignatures;
        self.store.update_document(&document)?;

        match document.signing_mode {
            SigningMode::Parallel => {
                for signer in &signers {
                    self.invite(&document, signer.clone())?;
                }
            },
            SigningMode::Sequential => {
                if let Some(first) = signers.iter().min_by_key(|s| s.order) {
                    self.invite(&document, first.clone())?;
                }
            },
        }

        self.events.publish(DomainEvent::DocumentSent {
            document_id,
            tenant_id: document.tenant_id,
            signing_mode: document.signing_mode,
            sent_at: Utc::now(),
        });
        log::info!("document {} sent ({})", document_id, document.signing_mode.as_str());
        Ok(())
    }

    /// Resolve a signer by access token. The error carries no hint about
    /// whether the token was malformed, stale or simply unknown.
    pub fn find_signer_by_token(&self, token: &str) -> Result<Signer> {
        self.store
            .find_signer_by_token(token)
            .map_err(|_| Error::NotFound("signer".to_string()))
    }

    /// Accept a signature.
    ///
    /// On the last signature the caller's thread claims finalization and,
    /// if it wins the claim, runs the pipeline inline. In sequential mode a
    /// non-final acceptance invites the next signer instead.
    pub fn accept_signature(&self, request: &AcceptRequest) -> Result<Signer> {
        let mut signer = self.find_signer_by_token(&request.token)?;
        if !request.consent_given {
            return Err(Error::Validation("signing requires explicit consent".to_string()));
        }
        if signer.has_signed() {
            return Err(Error::InvalidState("signature already recorded".to_string()));
        }

        let document = self.store.find_document(signer.document_id)?;
        if document.status != DocumentStatus::PendingSignatures {
            return Err(Error::InvalidState(format!(
                "document is {} and not open for signing",
                document.status.as_str()
            )));
        }
        let now = Utc::now();
        if document.is_expired_at(now) {
            return Err(Error::InvalidState("signing window has closed".to_string()));
        }

        let peers = self.store.signers_for_document(document.id)?;
        if document.signing_mode == SigningMode::Sequential {
            let blocked = peers.iter().any(|p| {
                p.id != signer.id && !p.has_signed() && p.order < signer.order
            });
            if blocked {
                return Err(Error::InvalidState(
                    "an earlier signer has not signed yet".to_string(),
                ));
            }
        }

        for (field_id, value) in &request.field_values {
            let owned = self
                .fields
                .fields_for_document(document.id)?
                .into_iter()
                .any(|f| f.id == *field_id && f.signer_id == signer.id);
            if !owned {
                return Err(Error::Validation("field does not belong to this signer".to_string()));
            }
            self.fields.save_value(*field_id, value)?;
        }

        signer.status = SignerStatus::Signed;
        signer.signed_at = Some(now);
        signer.ip_address = request.ip_address.clone();
        signer.user_agent = request.user_agent.clone();
        signer.signature_data = request.signature_data.clone();
        // Conditional write: a concurrent accept with the same token loses
        // here, keeping the Pending -> Signed transition single-shot.
        self.store.mark_signed(&signer)?;

        self.events.publish(DomainEvent::SignatureCompleted {
            document_id: document.id,
            tenant_id: document.tenant_id,
            signer_id: signer.id,
            signed_at: now,
        });

        if self.all_signers_signed(document.id)? {
            self.finalize_document(document.id)?;
        } else if document.signing_mode == SigningMode::Sequential {
            let next = self
                .store
                .signers_for_document(document.id)?
                .into_iter()
                .filter(|p| !p.has_signed())
                .min_by_key(|p| p.order);
            if let Some(next) = next {
                self.invite(&document, next)?;
            }
        }
        Ok(signer)
    }

    /// Whether every signer of the document has signed. A document with no
    /// signers is never "fully signed".
    pub fn all_signers_signed(&self, document_id: Uuid) -> Result<bool> {
        let signers = self.store.signers_for_document(document_id)?;
        Ok(!signers.is_empty() && signers.iter().all(Signer::has_signed))
    }

    /// Claim and run finalization. Returns the artifact for the winning
    /// caller, `None` when another caller already holds the claim.
    pub fn finalize_document(&self, document_id: Uuid) -> Result<Option<FinalizedArtifact>> {
        if !self.store.claim_finalization(document_id)? {
            log::debug!("finalization of {} already claimed elsewhere", document_id);
            return Ok(None);
        }
        self.run_pipeline_and_record(document_id).map(Some)
    }

    /// Re-run the pipeline for a document whose claim is held but whose
    /// completion never got recorded, after a transient storage failure.
    pub fn retry_finalization(&self, document_id: Uuid) -> Result<FinalizedArtifact> {
        let document = self.store.find_document(document_id)?;
        if document.status != DocumentStatus::PendingSignatures
            || !self.store.is_finalization_claimed(document_id)?
        {
            return Err(Error::InvalidState(
                "document has no interrupted finalization to retry".to_string(),
            ));
        }
        self.run_pipeline_and_record(document_id)
    }

    fn run_pipeline_and_record(&self, document_id: Uuid) -> Result<FinalizedArtifact> {
        let document = self.store.find_document(document_id)?;
        let signers = self.store.signers_for_document(document_id)?;
        let artifact = self.pipeline.run(&document, &signers)?;
        self.store.record_completion(document_id, &artifact.key, &artifact.sha256)?;
        self.events.publish(DomainEvent::DocumentCompleted {
            document_id,
            tenant_id: document.tenant_id,
            completed_at: Utc::now(),
        });
        Ok(artifact)
    }

    /// Resolve every pending document past its deadline.
    ///
    /// A document with at least one signature finalizes with what it has;
    /// one with none flips to `EXPIRED`.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<()> {
        for document in self.store.documents_past_expiry(now)? {
            let signers = self.store.signers_for_document(document.id)?;
            if signers.iter().any(Signer::has_signed) {
                log::info!("document {} expired partially signed, finalizing", document.id);
                if self.store.claim_finalization(document.id)? {
                    self.run_pipeline_and_record(document.id)?;
                }
            } else {
                log::info!("document {} expired unsigned", document.id);
                self.store.mark_expired(document.id)?;
                self.events.publish(DomainEvent::DocumentExpired {
                    document_id: document.id,
                    tenant_id: document.tenant_id,
                    expired_at: now,
                });
            }
        }
        Ok(())
    }

    /// Remind every already-invited pending signer, up to the configured
    /// cap per signer.
    pub fn send_reminders(&self, _now: DateTime<Utc>) -> Result<()> {
        for document in self.store.pending_documents()? {
            for mut signer in self.store.signers_for_document(document.id)? {
                if signer.has_signed()
                    || signer.notified_at.is_none()
                    || signer.reminder_count >= self.config.max_reminders
                {
                    continue;
                }
                self.dispatcher.send_reminder(&document, &signer);
                signer.reminder_count += 1;
                self.store.update_signer(&signer)?;
            }
        }
        Ok(())
    }

    /// Issue an identity-verification code for a signer.
    ///
    /// The code is returned for out-of-band dispatch and only its SHA-256
    /// hash is stored.
    pub fn start_identity_check(&self, token: &str) -> Result<String> {
        let mut signer = self.find_signer_by_token(token)?;
        if signer.has_signed() {
            return Err(Error::InvalidState("signer has already signed".to_string()));
        }
        let code = format!("{:06}", OsRng.next_u32() % 1_000_000);
        signer.verification = Some(IdentityVerification {
            code_hash: sha256_hex(code.as_bytes()),
            expires_at: Utc::now() + Duration::minutes(self.config.verification_ttl_minutes),
            attempts: 0,
        });
        self.store.update_signer(&signer)?;
        Ok(code)
    }

    /// Check an identity-verification code. A correct code clears the
    /// challenge; a wrong one burns an attempt until the cap locks it.
    pub fn confirm_identity(&self, token: &str, code: &str) -> Result<()> {
        let mut signer = self.find_signer_by_token(token)?;
        let challenge = signer
            .verification
            .clone()
            .ok_or_else(|| Error::InvalidState("no verification in progress".to_string()))?;

        if challenge.is_expired_at(Utc::now()) {
            return Err(Error::InvalidState("verification code has expired".to_string()));
        }
        if challenge.attempts >= self.config.verification_max_attempts {
            return Err(Error::InvalidState("too many failed verification attempts".to_string()));
        }
        if sha256_hex(code.as_bytes()) != challenge.code_hash {
            signer.verification = Some(IdentityVerification {
                attempts: challenge.attempts + 1,
                ..challenge
            });
            self.store.update_signer(&signer)?;
            return Err(Error::Validation("verification code does not match".to_string()));
        }

        signer.verification = None;
        self.store.update_signer(&signer)?;
        Ok(())
    }

    fn invite(&self, document: &Document, mut signer: Signer) -> Result<()> {
        signer.notified_at = Some(Utc::now());
        self.store.update_signer(&signer)?;
        self.dispatcher.send_signing_invite(document, &signer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::PassthroughSigner;
    use crate::domain::events::MemorySink;
    use crate::domain::{FieldKind, FieldRect, SignatureField};
    use crate::pdf::blank_document;
    use crate::store::{BlobStore, MemoryBlobStore, MemoryDispatcher, MemoryFieldStore, MemoryStore};

    struct Harness {
        store: Arc<MemoryStore>,
        fields: Arc<MemoryFieldStore>,
        dispatcher: Arc<MemoryDispatcher>,
        sink: Arc<MemorySink>,
        blobs: Arc<MemoryBlobStore>,
        workflow: SigningWorkflow,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let fields = Arc::new(MemoryFieldStore::new());
        let dispatcher = Arc::new(MemoryDispatcher::new());
        let sink = Arc::new(MemorySink::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let pipeline = FinalizationPipeline::new(
            Arc::clone(&blobs) as Arc<dyn BlobStore>,
            Arc::clone(&fields) as Arc<dyn FieldStore>,
            Arc::new(PassthroughSigner),
        );
        let workflow = SigningWorkflow::new(
            Arc::clone(&store) as Arc<dyn WorkflowStore>,
            Arc::clone(&fields) as Arc<dyn FieldStore>,
            Arc::clone(&dispatcher) as Arc<dyn NotificationDispatcher>,
            Arc::clone(&sink) as Arc<dyn EventSink>,
            pipeline,
        );
        Harness { store, fields, dispatcher, sink, blobs, workflow }
    }

    fn seed_document(h: &Harness, mode: SigningMode) -> Document {
        let document = Document::new(Uuid::new_v4(), Uuid::new_v4(), "NDA", "env/doc.pdf")
            .with_mode(mode);
        h.blobs
            .put("env/doc.pdf", &blank_document(&[(612.0, 792.0)]).unwrap(), "application/pdf")
            .unwrap();
        h.workflow.create_document(document.clone()).unwrap();
        document
    }

    fn seed_field(h: &Harness, document: &Document, signer: &Signer) -> SignatureField {
        let field = SignatureField::new(
            document.id,
            signer.id,
            FieldKind::Signature,
            1,
            FieldRect { x: 0.1, y: 0.8, width: 0.3, height: 0.08 },
        );
        h.fields.insert(field.clone());
        field
    }

    #[test]
    fn test_send_requires_signers_and_fields() {
        let h = harness();
        let document = seed_document(&h, SigningMode::Parallel);

        let err = h.workflow.send_document(document.id).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        let signer = h.workflow.add_signer(document.id, "Alice Kim", "alice@example.com", None).unwrap();
        let err = h.workflow.send_document(document.id).unwrap_err();
        assert!(err.to_string().contains("required field"));

        seed_field(&h, &document, &signer);
        h.workflow.send_document(document.id).unwrap();
        assert_eq!(
            h.store.find_document(document.id).unwrap().status,
            DocumentStatus::PendingSignatures
        );
        assert_eq!(h.dispatcher.invites().len(), 1);
        assert_eq!(h.sink.events_named("document.sent").len(), 1);
    }

    #[test]
    fn test_send_rejects_expired_draft() {
        let h = harness();
        let document = Document::new(Uuid::new_v4(), Uuid::new_v4(), "NDA", "env/doc.pdf")
            .with_expiry(Utc::now() - Duration::hours(1));
        h.blobs
            .put("env/doc.pdf", &blank_document(&[(612.0, 792.0)]).unwrap(), "application/pdf")
            .unwrap();
        h.workflow.create_document(document.clone()).unwrap();
        let signer = h.workflow.add_signer(document.id, "Alice Kim", "alice@example.com", None).unwrap();
        seed_field(&h, &document, &signer);

        let err = h.workflow.send_document(document.id).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
        // Nothing moved: still a draft, nobody invited, no event.
        assert_eq!(h.store.find_document(document.id).unwrap().status, DocumentStatus::Draft);
        assert!(h.dispatcher.invites().is_empty());
        assert!(h.sink.events_named("document.sent").is_empty());
    }

    #[test]
    fn test_send_twice_is_invalid() {
        let h = harness();
        let document = seed_document(&h, SigningMode::Parallel);
        let signer = h.workflow.add_signer(document.id, "Alice Kim", "alice@example.com", None).unwrap();
        seed_field(&h, &document, &signer);
        h.workflow.send_document(document.id).unwrap();
        assert!(matches!(h.workflow.send_document(document.id), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_sequential_send_requires_distinct_orders() {
        let h = harness();
        let document = seed_document(&h, SigningMode::Sequential);
        let a = h.workflow.add_signer(document.id, "Alice Kim", "alice@example.com", Some(1)).unwrap();
        h.workflow.add_signer(document.id, "Bob Osei", "bob@example.com", Some(1)).unwrap();
        seed_field(&h, &document, &a);

        let err = h.workflow.send_document(document.id).unwrap_err();
        assert!(err.to_string().contains("distinct order"));
    }

    #[test]
    fn test_all_signers_signed_is_false_for_empty_set() {
        let h = harness();
        let document = seed_document(&h, SigningMode::Parallel);
        assert!(!h.workflow.all_signers_signed(document.id).unwrap());
    }

    #[test]
    fn test_consent_is_mandatory() {
        let h = harness();
        let document = seed_document(&h, SigningMode::Parallel);
        let signer = h.workflow.add_signer(document.id, "Alice Kim", "alice@example.com", None).unwrap();
        seed_field(&h, &document, &signer);
        h.workflow.send_document(document.id).unwrap();

        let mut request = AcceptRequest::new(signer.access_token.clone());
        request.consent_given = false;
        assert!(matches!(h.workflow.accept_signature(&request), Err(Error::Validation(_))));
    }

    #[test]
    fn test_unknown_token_is_generic_not_found() {
        let h = harness();
        let err = h.workflow.find_signer_by_token("no-such-token").unwrap_err();
        assert_eq!(err.to_string(), Error::NotFound("signer".to_string()).to_string());
    }

    #[test]
    fn test_field_ownership_is_enforced() {
        let h = harness();
        let document = seed_document(&h, SigningMode::Parallel);
        let alice = h.workflow.add_signer(document.id, "Alice Kim", "alice@example.com", None).unwrap();
        let bob = h.workflow.add_signer(document.id, "Bob Osei", "bob@example.com", None).unwrap();
        seed_field(&h, &document, &alice);
        let bobs_field = seed_field(&h, &document, &bob);
        h.workflow.send_document(document.id).unwrap();

        let mut request = AcceptRequest::new(alice.access_token.clone());
        request.field_values = vec![(bobs_field.id, "forged".to_string())];
        let err = h.workflow.accept_signature(&request).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_identity_check_flow() {
        let h = harness();
        let document = seed_document(&h, SigningMode::Parallel);
        let signer = h.workflow.add_signer(document.id, "Alice Kim", "alice@example.com", None).unwrap();

        let code = h.workflow.start_identity_check(&signer.access_token).unwrap();
        assert_eq!(code.len(), 6);

        let err = h.workflow.confirm_identity(&signer.access_token, "000000x").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        h.workflow.confirm_identity(&signer.access_token, &code).unwrap();
        // Challenge is cleared after success.
        assert!(matches!(
            h.workflow.confirm_identity(&signer.access_token, &code),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_identity_check_attempt_cap() {
        let h = harness();
        let document = seed_document(&h, SigningMode::Parallel);
        let signer = h.workflow.add_signer(document.id, "Alice Kim", "alice@example.com", None).unwrap();
        h.workflow.start_identity_check(&signer.access_token).unwrap();

        for _ in 0..WorkflowConfig::default().verification_max_attempts {
            let err = h.workflow.confirm_identity(&signer.access_token, "wrong!").unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }
        let err = h.workflow.confirm_identity(&signer.access_token, "wrong!").unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_retry_without_interrupted_finalization_is_invalid() {
        let h = harness();
        let document = seed_document(&h, SigningMode::Parallel);
        assert!(matches!(
            h.workflow.retry_finalization(document.id),
            Err(Error::InvalidState(_))
        ));
    }
}
