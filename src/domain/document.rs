//! Document record and lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a document.
///
/// Transitions are `Draft -> PendingSignatures -> {Completed | Expired}`.
/// `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    /// Being prepared; signers and fields may still change.
    Draft,
    /// Sent out; waiting for one or more signatures.
    PendingSignatures,
    /// Finalized artifact produced. Terminal.
    Completed,
    /// Expired before all signatures arrived. Terminal.
    Expired,
}

impl DocumentStatus {
    /// Wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "DRAFT",
            DocumentStatus::PendingSignatures => "PENDING_SIGNATURES",
            DocumentStatus::Completed => "COMPLETED",
            DocumentStatus::Expired => "EXPIRED",
        }
    }
}

/// How signers are invited and ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SigningMode {
    /// All signers are notified at once and may sign in any order.
    #[default]
    Parallel,
    /// Signers are notified one at a time, by ascending `order`.
    Sequential,
}

impl SigningMode {
    /// Wire name of this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningMode::Parallel => "PARALLEL",
            SigningMode::Sequential => "SEQUENTIAL",
        }
    }
}

/// A document inside a signing envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Document id.
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Envelope this document belongs to.
    pub envelope_id: Uuid,
    /// Human-readable title.
    pub title: String,
    /// Blob key of the original upload.
    pub original_key: String,
    /// SHA-256 hex of the original upload.
    pub original_hash: Option<String>,
    /// Blob key of the finalized artifact, once produced.
    pub final_key: Option<String>,
    /// SHA-256 hex of the finalized artifact, once produced.
    pub final_hash: Option<String>,
    /// Current lifecycle status.
    pub status: DocumentStatus,
    /// Parallel or sequential signing.
    pub signing_mode: SigningMode,
    /// Optional expiry deadline.
    pub expires_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Monotonic record version, bumped on every store update.
    pub version: u64,
}

impl Document {
    /// Create a draft document for the given tenant and envelope.
    pub fn new(tenant_id: Uuid, envelope_id: Uuid, title: impl Into<String>, original_key: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            envelope_id,
            title: title.into(),
            original_key: original_key.into(),
            original_hash: None,
            final_key: None,
            final_hash: None,
            status: DocumentStatus::Draft,
            signing_mode: SigningMode::Parallel,
            expires_at: None,
            created_at: Utc::now(),
            version: 0,
        }
    }

    /// Set the signing mode.
    pub fn with_mode(mut self, mode: SigningMode) -> Self {
        self.signing_mode = mode;
        self
    }

    /// Set an expiry deadline.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the document is past its expiry deadline at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(deadline) if now > deadline)
    }

    /// Whether the document is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, DocumentStatus::Completed | DocumentStatus::Expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_status_names() {
        assert_eq!(DocumentStatus::PendingSignatures.as_str(), "PENDING_SIGNATURES");
        assert_eq!(DocumentStatus::Completed.as_str(), "COMPLETED");
        assert_eq!(SigningMode::Sequential.as_str(), "SEQUENTIAL");
    }

    #[test]
    fn test_new_document_is_draft() {
        let doc = Document::new(Uuid::new_v4(), Uuid::new_v4(), "NDA", "env/doc.pdf");
        assert_eq!(doc.status, DocumentStatus::Draft);
        assert_eq!(doc.signing_mode, SigningMode::Parallel);
        assert!(doc.final_key.is_none());
        assert_eq!(doc.version, 0);
    }

    #[test]
    fn test_expiry_check() {
        let now = Utc::now();
        let doc = Document::new(Uuid::new_v4(), Uuid::new_v4(), "NDA", "k")
            .with_expiry(now - Duration::hours(1));
        assert!(doc.is_expired_at(now));

        let doc = Document::new(Uuid::new_v4(), Uuid::new_v4(), "NDA", "k")
            .with_expiry(now + Duration::hours(1));
        assert!(!doc.is_expired_at(now));

        let doc = Document::new(Uuid::new_v4(), Uuid::new_v4(), "NDA", "k");
        assert!(!doc.is_expired_at(now));
    }

    #[test]
    fn test_terminal_states() {
        let mut doc = Document::new(Uuid::new_v4(), Uuid::new_v4(), "NDA", "k");
        assert!(!doc.is_terminal());
        doc.status = DocumentStatus::Completed;
        assert!(doc.is_terminal());
        doc.status = DocumentStatus::Expired;
        assert!(doc.is_terminal());
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&DocumentStatus::PendingSignatures).unwrap();
        assert_eq!(json, "\"PENDING_SIGNATURES\"");
    }
}
