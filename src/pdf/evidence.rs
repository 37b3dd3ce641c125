//! The appended audit page ("evidence page").
//!
//! Documents who signed, when, and from where, localized by a language tag.
//! Layout is a single top-to-bottom cursor over a fixed content width; when
//! an element no longer fits, a new page is started. All constants live in
//! [`EvidenceLayout`] so the algorithm stays auditable independent of the
//! exact values.

use chrono::{DateTime, Utc};
use lopdf::content::Operation;
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::domain::{Document as SigningDocument, Signer};
use crate::error::Result;
use crate::pdf::metrics::truncate_chars;
use crate::pdf::{
    append_page_ops, decode_data_url, escape_pdf_text, image_xobject, register_helvetica,
    register_image, scale_to_fit,
};

/// Maximum characters of the document title shown on the evidence page.
const TITLE_CHAR_BUDGET: usize = 60;
/// Maximum characters of a signer name shown on a card.
const NAME_CHAR_BUDGET: usize = 40;
/// User-agent character budget without a signature image on the card.
const USER_AGENT_CHAR_BUDGET: usize = 70;
/// User-agent character budget when a signature image is also drawn.
const USER_AGENT_CHAR_BUDGET_WITH_IMAGE: usize = 38;

/// Named layout constants for the evidence page (points, A4).
#[derive(Debug, Clone)]
pub struct EvidenceLayout {
    /// Page width.
    pub page_width: f32,
    /// Page height.
    pub page_height: f32,
    /// Outer margin on all sides.
    pub margin: f32,
    /// Height of the header banner.
    pub header_height: f32,
    /// Height of the document-info card.
    pub info_height: f32,
    /// Height of the signer-list heading line.
    pub heading_height: f32,
    /// Card height before optional rows.
    pub card_base_height: f32,
    /// Extra height per optional row (IP, user agent).
    pub card_line_height: f32,
    /// Vertical gap between elements.
    pub element_gap: f32,
    /// Width of the signature image box on a card.
    pub signature_box_width: f32,
    /// Height of the signature image box on a card.
    pub signature_box_height: f32,
    /// Height of the footer legal notice.
    pub footer_height: f32,
    /// Width of the colored accent bar on a card.
    pub accent_bar_width: f32,
    /// Title font size.
    pub title_size: f32,
    /// Subtitle and heading font size.
    pub subtitle_size: f32,
    /// Body font size.
    pub body_size: f32,
    /// Footer and metadata font size.
    pub small_size: f32,
}

impl Default for EvidenceLayout {
    fn default() -> Self {
        Self {
            page_width: 595.0,
            page_height: 842.0,
            margin: 40.0,
            header_height: 70.0,
            info_height: 48.0,
            heading_height: 18.0,
            card_base_height: 64.0,
            card_line_height: 12.0,
            element_gap: 10.0,
            signature_box_width: 110.0,
            signature_box_height: 40.0,
            footer_height: 34.0,
            accent_bar_width: 3.0,
            title_size: 16.0,
            subtitle_size: 10.0,
            body_size: 9.0,
            small_size: 7.5,
        }
    }
}

impl EvidenceLayout {
    fn content_width(&self) -> f32 {
        self.page_width - 2.0 * self.margin
    }

    fn card_height(&self, signer: &Signer) -> f32 {
        let mut height = self.card_base_height;
        if signer.ip_address.is_some() {
            height += self.card_line_height;
        }
        if signer.user_agent.is_some() {
            height += self.card_line_height;
        }
        height
    }
}

/// On-page strings and timestamp format for one language.
#[derive(Debug, Clone)]
pub struct EvidenceLocale {
    /// BCP 47-ish tag this locale answers to.
    pub tag: &'static str,
    title: &'static str,
    subtitle: &'static str,
    document_label: &'static str,
    generated_label: &'static str,
    signers_label: &'static str,
    signed_label: &'static str,
    pending_label: &'static str,
    ip_label: &'static str,
    device_label: &'static str,
    footer_line1: &'static str,
    footer_line2: &'static str,
    timestamp_format: &'static str,
}

impl EvidenceLocale {
    /// Resolve a language tag, falling back to English.
    pub fn for_tag(tag: &str) -> Self {
        let primary = tag.split(['-', '_']).next().unwrap_or("en").to_ascii_lowercase();
        match primary.as_str() {
            "es" => Self {
                tag: "es",
                title: "Certificado de firmas",
                subtitle: "Registro de firmas capturadas electronicamente",
                document_label: "Documento",
                generated_label: "Generado",
                signers_label: "Firmantes",
                signed_label: "Firmado",
                pending_label: "Pendiente",
                ip_label: "Direccion IP",
                device_label: "Dispositivo",
                footer_line1: "Esta pagina se genero automaticamente y registra los eventos de firma electronica de este documento.",
                footer_line2: "Verifique la integridad del documento comparando su huella digital con los registros anteriores.",
                timestamp_format: "%d/%m/%Y %H:%M UTC",
            },
            "de" => Self {
                tag: "de",
                title: "Signaturzertifikat",
                subtitle: "Abschlussprotokoll der elektronisch erfassten Unterschriften",
                document_label: "Dokument",
                generated_label: "Erstellt",
                signers_label: "Unterzeichner",
                signed_label: "Unterzeichnet",
                pending_label: "Ausstehend",
                ip_label: "IP-Adresse",
                device_label: "Geraet",
                footer_line1: "Diese Seite wurde automatisch erzeugt und dokumentiert die elektronischen Signaturereignisse dieses Dokuments.",
                footer_line2: "Pruefen Sie die Integritaet des Dokuments durch Vergleich des Fingerabdrucks mit den obigen Eintraegen.",
                timestamp_format: "%d.%m.%Y %H:%M UTC",
            },
            _ => Self {
                tag: "en",
                title: "Signature Certificate",
                subtitle: "Completion record of electronically captured signatures",
                document_label: "Document",
                generated_label: "Generated",
                signers_label: "Signers",
                signed_label: "Signed",
                pending_label: "Pending",
                ip_label: "IP address",
                device_label: "Device",
                footer_line1: "This page was generated automatically and records the electronic signature events for this document.",
                footer_line2: "Verify the integrity of this document by comparing its fingerprint against the records above.",
                timestamp_format: "%b %d, %Y %H:%M UTC",
            },
        }
    }

    fn format_timestamp(&self, at: DateTime<Utc>) -> String {
        at.format(self.timestamp_format).to_string()
    }
}

/// Appends the localized, paginated audit page(s) to a document.
#[derive(Debug, Clone)]
pub struct EvidencePageComposer {
    layout: EvidenceLayout,
    locale: EvidenceLocale,
}

struct PageCursor {
    page_id: ObjectId,
    ops: Vec<Operation>,
    y: f32,
}

impl EvidencePageComposer {
    /// Create a composer for the given language tag with the default layout.
    pub fn new(language_tag: &str) -> Self {
        Self {
            layout: EvidenceLayout::default(),
            locale: EvidenceLocale::for_tag(language_tag),
        }
    }

    /// Replace the layout constants.
    pub fn with_layout(mut self, layout: EvidenceLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Append the evidence page(s) describing `signers` to `pdf_bytes`.
    ///
    /// Signers are rendered in the order given (document order). The page
    /// count grows as needed; every other byte of the input is preserved.
    pub fn append(
        &self,
        pdf_bytes: &[u8],
        document: &SigningDocument,
        signers: &[Signer],
        generated_at: DateTime<Utc>,
    ) -> Result<Vec<u8>> {
        let mut doc = Document::load_mem(pdf_bytes)?;

        let mut cursor = self.start_page(&mut doc)?;
        self.draw_header(&mut cursor);
        self.draw_info(&mut cursor, document, generated_at);
        self.draw_heading(&mut cursor, signers.len());

        for (index, signer) in signers.iter().enumerate() {
            let height = self.layout.card_height(signer);
            self.ensure_space(&mut doc, &mut cursor, height)?;
            self.draw_card(&mut doc, &mut cursor, index, signer)?;
        }

        self.ensure_space(&mut doc, &mut cursor, self.layout.footer_height)?;
        self.draw_footer(&mut cursor);
        self.flush(&mut doc, cursor)?;

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)?;
        Ok(buffer)
    }

    fn start_page(&self, doc: &mut Document) -> Result<PageCursor> {
        let page_id = crate::pdf::append_page(
            doc,
            self.layout.page_width,
            self.layout.page_height,
            Vec::new(),
            Dictionary::new(),
        )?;
        register_helvetica(doc, page_id)?;
        Ok(PageCursor {
            page_id,
            ops: Vec::new(),
            y: self.layout.page_height - self.layout.margin,
        })
    }

    fn flush(&self, doc: &mut Document, cursor: PageCursor) -> Result<()> {
        append_page_ops(doc, cursor.page_id, cursor.ops)
    }

    /// Start a new page if fewer than `height` points remain on this one.
    fn ensure_space(&self, doc: &mut Document, cursor: &mut PageCursor, height: f32) -> Result<()> {
        if cursor.y - height < self.layout.margin {
            let next = self.start_page(doc)?;
            let previous = std::mem::replace(cursor, next);
            self.flush(doc, previous)?;
        }
        Ok(())
    }

    fn draw_header(&self, cursor: &mut PageCursor) {
        let l = &self.layout;
        let top = cursor.y;
        fill_rect(&mut cursor.ops, ACCENT, l.margin, top - l.header_height, l.content_width(), l.header_height);
        text(&mut cursor.ops, "HvB", l.title_size, WHITE, l.margin + 14.0, top - 28.0, self.locale.title);
        text(&mut cursor.ops, "Hv", l.subtitle_size, WHITE, l.margin + 14.0, top - 46.0, self.locale.subtitle);
        cursor.y = top - l.header_height - l.element_gap;
    }

    fn draw_info(&self, cursor: &mut PageCursor, document: &SigningDocument, generated_at: DateTime<Utc>) {
        let l = &self.layout;
        let top = cursor.y;
        fill_rect(&mut cursor.ops, CARD_BG, l.margin, top - l.info_height, l.content_width(), l.info_height);

        let title = truncate_chars(&document.title, TITLE_CHAR_BUDGET);
        let title_line = format!("{}: {}", self.locale.document_label, title);
        let generated_line = format!(
            "{}: {}",
            self.locale.generated_label,
            self.locale.format_timestamp(generated_at)
        );
        text(&mut cursor.ops, "HvB", l.body_size, BLACK, l.margin + 10.0, top - 18.0, &title_line);
        text(&mut cursor.ops, "Hv", l.small_size, GRAY, l.margin + 10.0, top - 34.0, &generated_line);
        cursor.y = top - l.info_height - l.element_gap;
    }

    fn draw_heading(&self, cursor: &mut PageCursor, count: usize) {
        let l = &self.layout;
        let heading = format!("{} ({})", self.locale.signers_label, count);
        text(&mut cursor.ops, "HvB", l.subtitle_size, BLACK, l.margin, cursor.y - l.subtitle_size, &heading);
        cursor.y -= l.heading_height + l.element_gap / 2.0;
    }

    fn draw_card(
        &self,
        doc: &mut Document,
        cursor: &mut PageCursor,
        index: usize,
        signer: &Signer,
    ) -> Result<()> {
        let l = &self.layout;
        let height = l.card_height(signer);
        let top = cursor.y;
        let bottom = top - height;

        fill_rect(&mut cursor.ops, CARD_BG, l.margin, bottom, l.content_width(), height);
        fill_rect(&mut cursor.ops, ACCENT, l.margin, bottom, l.accent_bar_width, height);

        let text_x = l.margin + l.accent_bar_width + 10.0;
        let name = truncate_chars(&signer.name, NAME_CHAR_BUDGET);
        let name_line = format!("{}. {}", index + 1, name);
        text(&mut cursor.ops, "HvB", l.body_size, BLACK, text_x, top - 16.0, &name_line);
        text(&mut cursor.ops, "Hv", l.small_size, GRAY, text_x, top - 28.0, &signer.email);

        let signed_line = match signer.signed_at {
            Some(at) => format!("{}: {}", self.locale.signed_label, self.locale.format_timestamp(at)),
            None => self.locale.pending_label.to_string(),
        };
        text(&mut cursor.ops, "Hv", l.small_size, BLACK, text_x, top - 42.0, &signed_line);

        let has_image = signer.signature_data.is_some();
        let mut line_y = top - 54.0;
        if let Some(ip) = &signer.ip_address {
            let line = format!("{}: {}", self.locale.ip_label, ip);
            text(&mut cursor.ops, "Hv", l.small_size, GRAY, text_x, line_y, &line);
            line_y -= l.card_line_height;
        }
        if let Some(agent) = &signer.user_agent {
            let budget = if has_image {
                USER_AGENT_CHAR_BUDGET_WITH_IMAGE
            } else {
                USER_AGENT_CHAR_BUDGET
            };
            let line = format!("{}: {}", self.locale.device_label, truncate_chars(agent, budget));
            text(&mut cursor.ops, "Hv", l.small_size, GRAY, text_x, line_y, &line);
        }

        if let Some(data_url) = &signer.signature_data {
            self.draw_signature_image(doc, cursor, data_url, bottom)?;
        }

        cursor.y = bottom - l.element_gap;
        Ok(())
    }

    fn draw_signature_image(
        &self,
        doc: &mut Document,
        cursor: &mut PageCursor,
        data_url: &str,
        card_bottom: f32,
    ) -> Result<()> {
        let l = &self.layout;
        let img = match decode_data_url(data_url) {
            Ok(img) => img,
            Err(e) => {
                // The evidence page records events; a malformed stored image
                // must not block finalization.
                log::warn!("skipping undecodable signature image on evidence page: {}", e);
                return Ok(());
            },
        };
        let name = register_image(doc, cursor.page_id, image_xobject(&img)?)?;

        let box_x = l.margin + l.content_width() - l.signature_box_width - 10.0;
        let box_y = card_bottom + 10.0;
        fill_rect(&mut cursor.ops, WHITE, box_x, box_y, l.signature_box_width, l.signature_box_height);
        let (dx, dy, w, h) = scale_to_fit(
            img.width as f32,
            img.height as f32,
            l.signature_box_width - 4.0,
            l.signature_box_height - 4.0,
        );
        cursor.ops.push(Operation::new("q", vec![]));
        cursor.ops.push(Operation::new(
            "cm",
            vec![
                w.into(),
                0.into(),
                0.into(),
                h.into(),
                (box_x + 2.0 + dx).into(),
                (box_y + 2.0 + dy).into(),
            ],
        ));
        cursor.ops.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
        cursor.ops.push(Operation::new("Q", vec![]));
        Ok(())
    }

    fn draw_footer(&self, cursor: &mut PageCursor) {
        let l = &self.layout;
        let top = cursor.y;
        text(&mut cursor.ops, "Hv", l.small_size, GRAY, l.margin, top - 12.0, self.locale.footer_line1);
        text(&mut cursor.ops, "Hv", l.small_size, GRAY, l.margin, top - 24.0, self.locale.footer_line2);
        cursor.y = top - l.footer_height;
    }
}

const BLACK: (f32, f32, f32) = (0.0, 0.0, 0.0);
const GRAY: (f32, f32, f32) = (0.38, 0.42, 0.48);
const WHITE: (f32, f32, f32) = (1.0, 1.0, 1.0);
const ACCENT: (f32, f32, f32) = (0.23, 0.42, 0.84);
const CARD_BG: (f32, f32, f32) = (0.95, 0.96, 0.98);

fn fill_rect(ops: &mut Vec<Operation>, color: (f32, f32, f32), x: f32, y: f32, w: f32, h: f32) {
    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new("rg", vec![color.0.into(), color.1.into(), color.2.into()]));
    ops.push(Operation::new("re", vec![x.into(), y.into(), w.into(), h.into()]));
    ops.push(Operation::new("f", vec![]));
    ops.push(Operation::new("Q", vec![]));
}

fn text(ops: &mut Vec<Operation>, font: &str, size: f32, color: (f32, f32, f32), x: f32, y: f32, value: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![Object::Name(font.as_bytes().to_vec()), size.into()]));
    ops.push(Operation::new("rg", vec![color.0.into(), color.1.into(), color.2.into()]));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new("Tj", vec![Object::string_literal(escape_pdf_text(value))]));
    ops.push(Operation::new("ET", vec![]));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Document as SigningDocument, Signer, SignerStatus};
    use crate::pdf::blank_document;
    use uuid::Uuid;

    fn document() -> SigningDocument {
        SigningDocument::new(Uuid::new_v4(), Uuid::new_v4(), "Master Service Agreement", "env/doc.pdf")
    }

    fn signed_signer(doc: &SigningDocument, name: &str) -> Signer {
        let mut signer = Signer::new(doc, name, "signer@example.com");
        signer.status = SignerStatus::Signed;
        signer.signed_at = Some(Utc::now());
        signer.ip_address = Some("203.0.113.9".to_string());
        signer.user_agent = Some("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)".to_string());
        signer
    }

    #[test]
    fn test_appends_one_page_for_few_signers() {
        let original = blank_document(&[(612.0, 792.0)]).unwrap();
        let doc = document();
        let signers = vec![signed_signer(&doc, "Alice Kim"), signed_signer(&doc, "Bob Osei")];

        let out = EvidencePageComposer::new("en")
            .append(&original, &doc, &signers, Utc::now())
            .unwrap();
        let loaded = Document::load_mem(&out).unwrap();
        assert_eq!(loaded.get_pages().len(), 2);
    }

    #[test]
    fn test_pagination_starts_new_pages() {
        let original = blank_document(&[(612.0, 792.0)]).unwrap();
        let doc = document();
        let signers: Vec<Signer> = (0..24).map(|i| signed_signer(&doc, &format!("Signer {}", i))).collect();

        let out = EvidencePageComposer::new("en")
            .append(&original, &doc, &signers, Utc::now())
            .unwrap();
        let loaded = Document::load_mem(&out).unwrap();
        // 24 cards at ~98pt each cannot fit one A4 content column.
        assert!(loaded.get_pages().len() >= 4);
    }

    #[test]
    fn test_card_height_depends_on_optional_rows() {
        let layout = EvidenceLayout::default();
        let doc = document();
        let mut signer = Signer::new(&doc, "Alice Kim", "alice@example.com");
        let bare = layout.card_height(&signer);
        signer.ip_address = Some("203.0.113.9".to_string());
        let with_ip = layout.card_height(&signer);
        signer.user_agent = Some("agent".to_string());
        let with_both = layout.card_height(&signer);

        assert_eq!(bare, layout.card_base_height);
        assert_eq!(with_ip, bare + layout.card_line_height);
        assert_eq!(with_both, bare + 2.0 * layout.card_line_height);
    }

    #[test]
    fn test_locale_fallback_and_resolution() {
        assert_eq!(EvidenceLocale::for_tag("es-MX").tag, "es");
        assert_eq!(EvidenceLocale::for_tag("de").tag, "de");
        assert_eq!(EvidenceLocale::for_tag("fr-FR").tag, "en");
        assert_eq!(EvidenceLocale::for_tag("").tag, "en");
    }

    #[test]
    fn test_localized_strings_end_up_on_page() {
        let original = blank_document(&[(612.0, 792.0)]).unwrap();
        let doc = document();
        let signers = vec![signed_signer(&doc, "Alice Kim")];

        let out = EvidencePageComposer::new("de")
            .append(&original, &doc, &signers, Utc::now())
            .unwrap();
        let loaded = Document::load_mem(&out).unwrap();
        let evidence_page = loaded.get_pages()[&2];
        let content = loaded.get_page_content(evidence_page).unwrap();
        let content_text = String::from_utf8_lossy(&content);
        assert!(content_text.contains("Signaturzertifikat"));
        assert!(content_text.contains("Unterzeichner"));
    }

    #[test]
    fn test_title_is_truncated() {
        let original = blank_document(&[(612.0, 792.0)]).unwrap();
        let mut doc = document();
        doc.title = "T".repeat(200);
        let signers = vec![signed_signer(&doc, "Alice Kim")];

        let out = EvidencePageComposer::new("en")
            .append(&original, &doc, &signers, Utc::now())
            .unwrap();
        let loaded = Document::load_mem(&out).unwrap();
        let evidence_page = loaded.get_pages()[&2];
        let content = loaded.get_page_content(evidence_page).unwrap();
        let content_text = String::from_utf8_lossy(&content);
        assert!(!content_text.contains(&"T".repeat(61)));
        assert!(content_text.contains(&format!("{}...", "T".repeat(57))));
    }

    #[test]
    fn test_bad_signature_image_does_not_fail() {
        let original = blank_document(&[(612.0, 792.0)]).unwrap();
        let doc = document();
        let mut signer = signed_signer(&doc, "Alice Kim");
        signer.signature_data = Some("data:image/png;base64,not-base64".to_string());

        let out = EvidencePageComposer::new("en")
            .append(&original, &doc, &[signer], Utc::now())
            .unwrap();
        assert!(Document::load_mem(&out).is_ok());
    }
}
