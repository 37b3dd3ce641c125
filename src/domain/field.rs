//! Signature fields and their normalized placement.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of value a field captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Drawn or uploaded signature image.
    Signature,
    /// Signer's full name.
    Name,
    /// Signing date.
    Date,
    /// Signer's initials.
    Initials,
    /// Free-form text.
    Text,
}

/// Field rectangle in normalized page space.
///
/// All components are conceptually in `[0, 1]`, with a top-left origin.
/// [`FieldEmbedder`](crate::pdf::FieldEmbedder) converts to the PDF's
/// absolute bottom-left point space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldRect {
    /// Left edge, fraction of page width.
    pub x: f32,
    /// Top edge, fraction of page height.
    pub y: f32,
    /// Width, fraction of page width.
    pub width: f32,
    /// Height, fraction of page height.
    pub height: f32,
}

/// A field placed on a document page for one signer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureField {
    /// Field id.
    pub id: Uuid,
    /// Document this field belongs to.
    pub document_id: Uuid,
    /// Signer responsible for this field.
    pub signer_id: Uuid,
    /// Kind of value captured.
    pub kind: FieldKind,
    /// 1-based page number. Must reference an existing page of the original.
    pub page: u32,
    /// Normalized placement rectangle.
    pub rect: FieldRect,
    /// Whether a value must be captured before the document can complete.
    pub required: bool,
    /// Captured value: plain text or a `data:image/...` URL. Empty until
    /// the signer accepts.
    pub value: Option<String>,
}

impl SignatureField {
    /// Create an empty required field.
    pub fn new(document_id: Uuid, signer_id: Uuid, kind: FieldKind, page: u32, rect: FieldRect) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            signer_id,
            kind,
            page,
            rect,
            required: true,
            value: None,
        }
    }

    /// Whether a non-empty value has been captured.
    pub fn has_value(&self) -> bool {
        matches!(self.value.as_deref(), Some(v) if !v.is_empty())
    }

    /// Whether the captured value is an image data-URL.
    pub fn is_image_value(&self) -> bool {
        matches!(self.value.as_deref(), Some(v) if v.starts_with("data:image/"))
    }
}
