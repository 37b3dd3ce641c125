//! Signer record and identity-verification state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::token::generate_access_token;

/// Lifecycle status of a signer. `Signed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignerStatus {
    /// Invited, has not signed yet.
    Pending,
    /// Signed. Terminal.
    Signed,
}

impl SignerStatus {
    /// Wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignerStatus::Pending => "PENDING",
            SignerStatus::Signed => "SIGNED",
        }
    }
}

/// Optional out-of-band identity verification state for a signer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityVerification {
    /// SHA-256 hex of the verification code.
    pub code_hash: String,
    /// Deadline after which the code is rejected.
    pub expires_at: DateTime<Utc>,
    /// Failed attempts so far.
    pub attempts: u32,
}

impl IdentityVerification {
    /// Whether the code is past its deadline at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// An invited party, identified solely by its access token.
#[derive(Clone, Serialize, Deserialize)]
pub struct Signer {
    /// Signer id.
    pub id: Uuid,
    /// Document this signer belongs to.
    pub document_id: Uuid,
    /// Envelope this signer belongs to.
    pub envelope_id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Display name.
    pub name: String,
    /// Invite email address.
    pub email: String,
    /// Current status.
    pub status: SignerStatus,
    /// High-entropy capability token. Unique per signer, never reused.
    pub access_token: String,
    /// Position in sequential mode. `None` in parallel mode.
    pub order: Option<u32>,
    /// When the signature was accepted.
    pub signed_at: Option<DateTime<Utc>>,
    /// Remote address captured at acceptance.
    pub ip_address: Option<String>,
    /// User agent captured at acceptance.
    pub user_agent: Option<String>,
    /// Captured signature image as a `data:image/...` URL.
    pub signature_data: Option<String>,
    /// When the signing invite was last dispatched.
    pub notified_at: Option<DateTime<Utc>>,
    /// Reminders sent so far.
    pub reminder_count: u32,
    /// Optional identity-verification challenge.
    pub verification: Option<IdentityVerification>,
}

impl Signer {
    /// Create a pending signer with a fresh access token.
    pub fn new(document: &crate::domain::Document, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id: document.id,
            envelope_id: document.envelope_id,
            tenant_id: document.tenant_id,
            name: name.into(),
            email: email.into(),
            status: SignerStatus::Pending,
            access_token: generate_access_token(),
            order: None,
            signed_at: None,
            ip_address: None,
            user_agent: None,
            signature_data: None,
            notified_at: None,
            reminder_count: 0,
            verification: None,
        }
    }

    /// Whether this signer has signed.
    pub fn has_signed(&self) -> bool {
        self.status == SignerStatus::Signed
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("id", &self.id)
            .field("document_id", &self.document_id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("status", &self.status)
            .field("access_token", &"[REDACTED]")
            .field("order", &self.order)
            .field("signed_at", &self.signed_at)
            .finish()
    }
}
