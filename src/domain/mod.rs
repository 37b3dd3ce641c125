//! Domain records for the signing workflow.
//!
//! Documents, signers and signature fields are created by the surrounding
//! envelope-management subsystem and mutated only through
//! [`SigningWorkflow`](crate::workflow::SigningWorkflow) operations; this
//! core never deletes them.

mod document;
mod field;
mod signer;

pub mod events;

pub use document::{Document, DocumentStatus, SigningMode};
pub use field::{FieldKind, FieldRect, SignatureField};
pub use signer::{IdentityVerification, Signer, SignerStatus};
