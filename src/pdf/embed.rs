//! Burning captured field values into the original document.
//!
//! Values are drawn as static page content (a flattened re-serialization),
//! never as editable form fields.

use lopdf::content::Operation;
use lopdf::{Document, Object};

use crate::domain::SignatureField;
use crate::error::Result;
use crate::pdf::metrics::{fit_font_size, text_width};
use crate::pdf::{
    append_page_ops, decode_data_url, escape_pdf_text, image_xobject, page_size, register_helvetica,
    register_image, scale_to_fit,
};

/// Embeds captured field values into a PDF at normalized coordinates.
#[derive(Debug, Clone)]
pub struct FieldEmbedder {
    /// Padding kept between an image and its field box, in points.
    pub image_padding: f32,
}

impl Default for FieldEmbedder {
    fn default() -> Self {
        Self { image_padding: 4.0 }
    }
}

impl FieldEmbedder {
    /// Create an embedder with the default padding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Burn every field carrying a non-empty captured value into `pdf_bytes`
    /// and return the flattened re-serialization.
    ///
    /// Fields without a value are skipped silently; fields referencing a
    /// nonexistent page are skipped with a warning, never an error.
    pub fn embed(&self, pdf_bytes: &[u8], fields: &[SignatureField]) -> Result<Vec<u8>> {
        let mut doc = Document::load_mem(pdf_bytes)?;
        let pages = doc.get_pages();

        for field in fields.iter().filter(|f| f.has_value()) {
            let page_id = match pages.get(&field.page) {
                Some(id) => *id,
                None => {
                    log::warn!(
                        "field {} targets page {} of a {}-page document, skipping",
                        field.id,
                        field.page,
                        pages.len()
                    );
                    continue;
                },
            };

            let (page_w, page_h) = page_size(&doc, page_id);

            // Normalized top-left space to absolute bottom-left point space.
            let abs_x = field.rect.x * page_w;
            let abs_w = field.rect.width * page_w;
            let abs_h = field.rect.height * page_h;
            let abs_y = page_h - field.rect.y * page_h - abs_h;

            let value = field.value.as_deref().unwrap_or_default();
            let ops = if field.is_image_value() {
                self.image_ops(&mut doc, page_id, value, abs_x, abs_y, abs_w, abs_h)?
            } else {
                register_helvetica(&mut doc, page_id)?;
                text_ops(value, abs_x, abs_y, abs_w, abs_h)
            };
            append_page_ops(&mut doc, page_id, ops)?;
        }

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)?;
        Ok(buffer)
    }

    fn image_ops(
        &self,
        doc: &mut Document,
        page_id: lopdf::ObjectId,
        value: &str,
        abs_x: f32,
        abs_y: f32,
        abs_w: f32,
        abs_h: f32,
    ) -> Result<Vec<Operation>> {
        let img = decode_data_url(value)?;
        let name = register_image(doc, page_id, image_xobject(&img)?)?;

        let inner_w = (abs_w - 2.0 * self.image_padding).max(0.0);
        let inner_h = (abs_h - 2.0 * self.image_padding).max(0.0);
        let (dx, dy, draw_w, draw_h) = scale_to_fit(img.width as f32, img.height as f32, inner_w, inner_h);

        let x = abs_x + self.image_padding + dx;
        let y = abs_y + self.image_padding + dy;
        Ok(vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![draw_w.into(), 0.into(), 0.into(), draw_h.into(), x.into(), y.into()],
            ),
            Operation::new("Do", vec![Object::Name(name.into_bytes())]),
            Operation::new("Q", vec![]),
        ])
    }
}

fn text_ops(value: &str, abs_x: f32, abs_y: f32, abs_w: f32, abs_h: f32) -> Vec<Operation> {
    let size = fit_font_size(value, abs_w);
    let rendered = text_width(value, size);
    let x = abs_x + ((abs_w - rendered) / 2.0).max(0.0);
    // Vertical centering, approximating the cap height at 70% of the size.
    let y = abs_y + ((abs_h - size * 0.7) / 2.0).max(0.0);
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(b"Hv".to_vec()), size.into()]),
        Operation::new("rg", vec![0.into(), 0.into(), 0.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(escape_pdf_text(value))]),
        Operation::new("ET", vec![]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldKind, FieldRect};
    use crate::pdf::blank_document;
    use crate::pdf::metrics::MIN_FIT_SIZE;
    use uuid::Uuid;

    fn field_on_page(page: u32, value: Option<&str>) -> SignatureField {
        let mut f = SignatureField::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            FieldKind::Signature,
            page,
            FieldRect { x: 0.1, y: 0.8, width: 0.3, height: 0.08 },
        );
        f.value = value.map(str::to_string);
        f
    }

    #[test]
    fn test_empty_value_is_a_noop() {
        let original = blank_document(&[(612.0, 792.0)]).unwrap();
        let out = FieldEmbedder::new()
            .embed(&original, &[field_on_page(1, None), field_on_page(1, Some(""))])
            .unwrap();
        // Still a loadable single-page document with untouched content.
        let doc = Document::load_mem(&out).unwrap();
        let page = doc.get_pages()[&1];
        assert!(doc.get_page_content(page).unwrap().is_empty());
    }

    #[test]
    fn test_out_of_range_page_is_skipped_not_an_error() {
        let original = blank_document(&[(612.0, 792.0)]).unwrap();
        let out = FieldEmbedder::new()
            .embed(&original, &[field_on_page(7, Some("Alice Kim"))])
            .unwrap();
        assert_eq!(Document::load_mem(&out).unwrap().get_pages().len(), 1);
    }

    #[test]
    fn test_text_value_is_burned_into_content() {
        let original = blank_document(&[(612.0, 792.0)]).unwrap();
        let out = FieldEmbedder::new()
            .embed(&original, &[field_on_page(1, Some("Alice Kim"))])
            .unwrap();

        let doc = Document::load_mem(&out).unwrap();
        let page = doc.get_pages()[&1];
        let content = doc.get_page_content(page).unwrap();
        let text = String::from_utf8_lossy(&content);
        assert!(text.contains("Alice Kim"));
        assert!(text.contains("BT"));
        // Flattened: no AcroForm appears.
        assert!(doc.catalog().unwrap().get(b"AcroForm").is_err());
    }

    #[test]
    fn test_image_value_registers_xobject() {
        let original = blank_document(&[(612.0, 792.0)]).unwrap();
        let url = format!("data:image/png;base64,{}", super::super::tests::TINY_PNG_B64);
        let out = FieldEmbedder::new()
            .embed(&original, &[field_on_page(1, Some(&url))])
            .unwrap();

        let doc = Document::load_mem(&out).unwrap();
        let page = doc.get_pages()[&1];
        let content = doc.get_page_content(page).unwrap();
        let text = String::from_utf8_lossy(&content);
        assert!(text.contains("/ImSig0"));
        assert!(text.contains("Do"));
    }

    #[test]
    fn test_coordinate_transform() {
        // 0.25/0.5 on a 600x800 page, box 0.5x0.25.
        let page_w = 600.0;
        let page_h = 800.0;
        let rect = FieldRect { x: 0.25, y: 0.5, width: 0.5, height: 0.25 };
        let abs_x = rect.x * page_w;
        let abs_w = rect.width * page_w;
        let abs_h = rect.height * page_h;
        let abs_y = page_h - rect.y * page_h - abs_h;
        assert_eq!(abs_x, 150.0);
        assert_eq!(abs_w, 300.0);
        assert_eq!(abs_h, 200.0);
        assert_eq!(abs_y, 200.0);
    }

    #[test]
    fn test_long_text_uses_minimum_size() {
        let value = "An extremely long captured value that cannot fit the box at any size";
        let ops = text_ops(value, 10.0, 10.0, 40.0, 12.0);
        let tf = &ops[1];
        assert_eq!(tf.operator, "Tf");
        assert_eq!(tf.operands[1], Object::Real(MIN_FIT_SIZE));
    }
}
