//! Error types for the signing core.
//!
//! One crate-wide taxonomy covers the workflow state machine, the PDF
//! pipeline, and the certificate vault. Callers branch on the variant, not
//! on message text.

/// Result type alias for signing-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur across the signing workflow and pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown token or document. The message is intentionally generic so
    /// callers cannot distinguish "wrong token" from "wrong tenant".
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation rejected by the current lifecycle state (already signed,
    /// document completed or expired, send preconditions unmet).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Rejected input: malformed or expired certificate, wrong passphrase,
    /// missing consent.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Fatal, non-retryable failure: certificate signing failed after a
    /// certificate was configured.
    #[error("Integrity failure: {0}")]
    Integrity(String),

    /// Transient blob I/O failure during finalize. Retryable by the caller.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Malformed or unmanageable PDF input.
    #[error("PDF error: {0}")]
    Pdf(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the caller may safely retry the failed operation.
    ///
    /// Only storage failures are transient; everything else reflects a
    /// decision that will not change on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::Pdf(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_is_generic() {
        let err = Error::NotFound("signer".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("Not found"));
        assert!(!msg.contains("token"));
    }

    #[test]
    fn test_invalid_state_message() {
        let err = Error::InvalidState("document already completed".to_string());
        assert!(format!("{}", err).contains("already completed"));
    }

    #[test]
    fn test_only_storage_is_transient() {
        assert!(Error::Storage("blob write failed".to_string()).is_transient());
        assert!(!Error::Integrity("signing failed".to_string()).is_transient());
        assert!(!Error::Validation("bad passphrase".to_string()).is_transient());
        assert!(!Error::NotFound("document".to_string()).is_transient());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
