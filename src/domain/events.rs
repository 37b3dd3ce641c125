//! Domain events raised by the workflow.
//!
//! Events are fire-and-forget from this core's perspective and delivered
//! at-least-once; consumers (webhook queues, audit trails) deduplicate on
//! their side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

/// A domain event emitted by the signing workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A signer accepted their signature.
    SignatureCompleted {
        /// Document the signature belongs to.
        document_id: Uuid,
        /// Owning tenant.
        tenant_id: Uuid,
        /// Signer that accepted.
        signer_id: Uuid,
        /// Acceptance timestamp.
        signed_at: DateTime<Utc>,
    },
    /// A document entered `PENDING_SIGNATURES`.
    DocumentSent {
        /// Document that was sent.
        document_id: Uuid,
        /// Owning tenant.
        tenant_id: Uuid,
        /// Parallel or sequential.
        signing_mode: crate::domain::SigningMode,
        /// Send timestamp.
        sent_at: DateTime<Utc>,
    },
    /// A document was finalized.
    DocumentCompleted {
        /// Document that completed.
        document_id: Uuid,
        /// Owning tenant.
        tenant_id: Uuid,
        /// Completion timestamp.
        completed_at: DateTime<Utc>,
    },
    /// A document expired before completion.
    DocumentExpired {
        /// Document that expired.
        document_id: Uuid,
        /// Owning tenant.
        tenant_id: Uuid,
        /// Expiry timestamp.
        expired_at: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Dotted event name, as consumed by external subscribers.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::SignatureCompleted { .. } => "signature.completed",
            DomainEvent::DocumentSent { .. } => "document.sent",
            DomainEvent::DocumentCompleted { .. } => "document.completed",
            DomainEvent::DocumentExpired { .. } => "document.expired",
        }
    }

    /// Document id this event concerns.
    pub fn document_id(&self) -> Uuid {
        match self {
            DomainEvent::SignatureCompleted { document_id, .. }
            | DomainEvent::DocumentSent { document_id, .. }
            | DomainEvent::DocumentCompleted { document_id, .. }
            | DomainEvent::DocumentExpired { document_id, .. } => *document_id,
        }
    }
}

/// Sink for domain events.
///
/// Implementations must not fail the emitting operation; delivery problems
/// are their own concern.
pub trait EventSink: Send + Sync {
    /// Publish one event.
    fn publish(&self, event: DomainEvent);
}

/// In-memory sink collecting events, for tests and embedders.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events published so far.
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Events with the given dotted name.
    pub fn events_named(&self, name: &str) -> Vec<DomainEvent> {
        self.events().into_iter().filter(|e| e.name() == name).collect()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: DomainEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
