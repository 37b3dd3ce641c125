//! PDF manipulation: field embedding, evidence pages, shared helpers.
//!
//! Byte format is standard PDF in and out. The only project-specific
//! contract is the normalized-coordinate convention used by
//! [`SignatureField`](crate::domain::SignatureField) rectangles: top-left
//! origin, components in `[0, 1]`, converted here to the PDF's bottom-left
//! point space.

mod embed;
mod evidence;
pub mod metrics;

pub use embed::FieldEmbedder;
pub use evidence::{EvidenceLayout, EvidenceLocale, EvidencePageComposer};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::GenericImageView;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{Error, Result};

/// Default page size when a page carries no resolvable MediaBox
/// (US Letter, in points).
pub const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

/// Decoded signature image from a `data:image/...` URL.
#[derive(Debug, Clone)]
pub(crate) struct DataUrlImage {
    pub format: SniffedFormat,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Image container format, sniffed from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SniffedFormat {
    Png,
    Jpeg,
}

/// Decode a `data:image/...;base64,` URL and sniff its container format.
pub(crate) fn decode_data_url(value: &str) -> Result<DataUrlImage> {
    let payload = value
        .split_once("base64,")
        .map(|(_, rest)| rest)
        .ok_or_else(|| Error::Validation("signature image is not a base64 data URL".to_string()))?;
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| Error::Validation(format!("signature image base64 is invalid: {}", e)))?;

    // Magic bytes decide the container, not the data-URL media type.
    let format = if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        SniffedFormat::Png
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        SniffedFormat::Jpeg
    } else {
        return Err(Error::Validation("signature image is neither PNG nor JPEG".to_string()));
    };

    let image_format = match format {
        SniffedFormat::Png => image::ImageFormat::Png,
        SniffedFormat::Jpeg => image::ImageFormat::Jpeg,
    };
    let decoded = image::load_from_memory_with_format(&bytes, image_format)
        .map_err(|e| Error::Validation(format!("signature image does not decode: {}", e)))?;
    let (width, height) = decoded.dimensions();

    Ok(DataUrlImage { format, width, height, bytes })
}

/// Build an image XObject stream for a decoded signature image.
///
/// JPEG data is embedded pass-through behind a DCTDecode filter; PNG data is
/// decoded and flattened onto white as raw 8-bit RGB, which keeps the output
/// viewer-safe at the cost of size.
pub(crate) fn image_xobject(img: &DataUrlImage) -> Result<Stream> {
    match img.format {
        SniffedFormat::Jpeg => {
            let decoded = image::load_from_memory_with_format(&img.bytes, image::ImageFormat::Jpeg)
                .map_err(|e| Error::Validation(format!("JPEG does not decode: {}", e)))?;
            let color_space = match decoded.color() {
                image::ColorType::L8 | image::ColorType::L16 => "DeviceGray",
                _ => "DeviceRGB",
            };
            Ok(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => img.width as i64,
                    "Height" => img.height as i64,
                    "ColorSpace" => color_space,
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                img.bytes.clone(),
            ))
        },
        SniffedFormat::Png => {
            let decoded = image::load_from_memory_with_format(&img.bytes, image::ImageFormat::Png)
                .map_err(|e| Error::Validation(format!("PNG does not decode: {}", e)))?;
            let rgba = decoded.to_rgba8();
            let mut rgb = Vec::with_capacity((img.width * img.height * 3) as usize);
            for pixel in rgba.pixels() {
                let [r, g, b, a] = pixel.0;
                // Flatten transparency onto white.
                let alpha = a as u16;
                rgb.push((((r as u16) * alpha + 255 * (255 - alpha)) / 255) as u8);
                rgb.push((((g as u16) * alpha + 255 * (255 - alpha)) / 255) as u8);
                rgb.push((((b as u16) * alpha + 255 * (255 - alpha)) / 255) as u8);
            }
            Ok(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => img.width as i64,
                    "Height" => img.height as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                },
                rgb,
            ))
        },
    }
}

/// Scale `(w, h)` to fit inside `(box_w, box_h)` preserving aspect ratio.
/// Returns the scaled size and the centering offset within the box.
pub(crate) fn scale_to_fit(w: f32, h: f32, box_w: f32, box_h: f32) -> (f32, f32, f32, f32) {
    if w <= 0.0 || h <= 0.0 || box_w <= 0.0 || box_h <= 0.0 {
        return (0.0, 0.0, 0.0, 0.0);
    }
    let scale = (box_w / w).min(box_h / h).min(1.0e6);
    let out_w = w * scale;
    let out_h = h * scale;
    ((box_w - out_w) / 2.0, (box_h - out_h) / 2.0, out_w, out_h)
}

/// Escape special characters for a PDF literal string.
///
/// The burned-in text uses unencoded Base-14 Helvetica, so only ASCII renders
/// as written. Accented Latin characters are folded to their plain ASCII
/// form; anything else becomes `?`.
pub(crate) fn escape_pdf_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '(' => result.push_str("\\("),
            ')' => result.push_str("\\)"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_ascii() => result.push(c),
            c => result.push_str(ascii_fold(c)),
        }
    }
    result
}

/// Nearest-ASCII fallback for the Latin-1/Latin Extended characters that
/// show up in European names. Unknown characters map to `?`.
fn ascii_fold(c: char) -> &'static str {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' | 'ā' => "a",
        'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' | 'Ā' => "A",
        'é' | 'è' | 'ê' | 'ë' | 'ē' => "e",
        'É' | 'È' | 'Ê' | 'Ë' | 'Ē' => "E",
        'í' | 'ì' | 'î' | 'ï' | 'ī' => "i",
        'Í' | 'Ì' | 'Î' | 'Ï' | 'Ī' => "I",
        'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ø' | 'ō' => "o",
        'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' | 'Ø' | 'Ō' => "O",
        'ú' | 'ù' | 'û' | 'ü' | 'ū' => "u",
        'Ú' | 'Ù' | 'Û' | 'Ü' | 'Ū' => "U",
        'ý' | 'ÿ' => "y",
        'Ý' => "Y",
        'ñ' => "n",
        'Ñ' => "N",
        'ç' => "c",
        'Ç' => "C",
        'š' => "s",
        'Š' => "S",
        'ž' => "z",
        'Ž' => "Z",
        'ß' => "ss",
        'æ' => "ae",
        'Æ' => "AE",
        'œ' => "oe",
        'Œ' => "OE",
        '\u{2018}' | '\u{2019}' => "'",
        '\u{201c}' | '\u{201d}' => "\"",
        '\u{2013}' | '\u{2014}' => "-",
        _ => "?",
    }
}

fn resolve<'a>(doc: &'a Document, mut obj: &'a Object) -> &'a Object {
    // Follow at most a short reference chain; malformed cycles fall out
    // with the last object seen.
    for _ in 0..8 {
        match obj {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(next) => obj = next,
                Err(_) => return obj,
            },
            _ => return obj,
        }
    }
    obj
}

fn as_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(v) => Some(*v as f32),
        Object::Real(v) => Some(*v),
        _ => None,
    }
}

/// Width and height of a page in points, walking the Parent chain for an
/// inherited MediaBox and defaulting to US Letter.
pub(crate) fn page_size(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let mut current = page_id;
    for _ in 0..16 {
        let dict = match doc.get_object(current).and_then(Object::as_dict) {
            Ok(d) => d,
            Err(_) => break,
        };
        if let Ok(media_box) = dict.get(b"MediaBox") {
            if let Ok(values) = resolve(doc, media_box).as_array() {
                let nums: Vec<f32> = values.iter().filter_map(|v| as_number(resolve(doc, v))).collect();
                if nums.len() == 4 {
                    return ((nums[2] - nums[0]).abs(), (nums[3] - nums[1]).abs());
                }
            }
        }
        match dict.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent) => current = parent,
            Err(_) => break,
        }
    }
    DEFAULT_PAGE_SIZE
}

/// Mutate a page's Resources dictionary in place, creating it if missing and
/// materializing an inline dictionary when needed.
pub(crate) fn with_page_resources<F>(doc: &mut Document, page_id: ObjectId, f: F) -> Result<()>
where
    F: FnOnce(&mut Dictionary),
{
    let resources_entry = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .map(|d| d.get(b"Resources").ok().cloned())
        .map_err(Error::from)?;

    match resources_entry {
        Some(Object::Reference(rid)) => {
            let resources = doc.get_object_mut(rid).and_then(Object::as_dict_mut)?;
            f(resources);
        },
        Some(Object::Dictionary(mut inline)) => {
            f(&mut inline);
            let page = doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
            page.set("Resources", Object::Dictionary(inline));
        },
        _ => {
            let mut resources = Dictionary::new();
            f(&mut resources);
            let page = doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
            page.set("Resources", Object::Dictionary(resources));
        },
    }
    Ok(())
}

/// Register an image XObject on a page, returning its resource name.
pub(crate) fn register_image(doc: &mut Document, page_id: ObjectId, stream: Stream) -> Result<String> {
    let xobject_id = doc.add_object(stream);
    let mut name = String::new();
    with_page_resources(doc, page_id, |resources| {
        if !matches!(resources.get(b"XObject"), Ok(Object::Dictionary(_))) {
            resources.set("XObject", Object::Dictionary(Dictionary::new()));
        }
        if let Ok(Object::Dictionary(xobjects)) = resources.get_mut(b"XObject") {
            name = format!("ImSig{}", xobjects.len());
            xobjects.set(name.clone(), Object::Reference(xobject_id));
        }
    })?;
    if name.is_empty() {
        return Err(Error::Pdf("could not register image resource".to_string()));
    }
    Ok(name)
}

/// Ensure the Base-14 Helvetica fonts are available on a page under the
/// names `Hv` and `HvB`.
pub(crate) fn register_helvetica(doc: &mut Document, page_id: ObjectId) -> Result<()> {
    with_page_resources(doc, page_id, |resources| {
        if !matches!(resources.get(b"Font"), Ok(Object::Dictionary(_))) {
            resources.set("Font", Object::Dictionary(Dictionary::new()));
        }
        let fonts = match resources.get_mut(b"Font") {
            Ok(Object::Dictionary(dict)) => dict,
            _ => return,
        };
        if fonts.get(b"Hv").is_err() {
            fonts.set(
                "Hv",
                Object::Dictionary(dictionary! {
                    "Type" => "Font", "Subtype" => "Type1", "BaseFont" => "Helvetica",
                }),
            );
        }
        if fonts.get(b"HvB").is_err() {
            fonts.set(
                "HvB",
                Object::Dictionary(dictionary! {
                    "Type" => "Font", "Subtype" => "Type1", "BaseFont" => "Helvetica-Bold",
                }),
            );
        }
    })
}

/// Append drawing operations to a page, preserving its existing content by
/// wrapping it in a save/restore pair.
pub(crate) fn append_page_ops(doc: &mut Document, page_id: ObjectId, ops: Vec<Operation>) -> Result<()> {
    let encoded = Content { operations: ops }
        .encode()
        .map_err(|e| Error::Pdf(format!("content encoding failed: {}", e)))?;
    let existing = doc.get_page_content(page_id).unwrap_or_default();

    let mut combined = Vec::with_capacity(existing.len() + encoded.len() + 8);
    combined.extend_from_slice(b"q\n");
    combined.extend_from_slice(&existing);
    combined.extend_from_slice(b"\nQ\n");
    combined.extend_from_slice(&encoded);
    doc.change_page_content(page_id, combined)?;
    Ok(())
}

/// The Pages tree root of a document.
pub(crate) fn pages_root(doc: &Document) -> Result<ObjectId> {
    doc.catalog()?
        .get(b"Pages")
        .and_then(Object::as_reference)
        .map_err(Error::from)
}

/// Append a fresh page with its own content stream and resources; returns
/// the new page's id.
pub(crate) fn append_page(
    doc: &mut Document,
    width: f32,
    height: f32,
    content: Vec<u8>,
    resources: Dictionary,
) -> Result<ObjectId> {
    let pages_id = pages_root(doc)?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => Object::Reference(pages_id),
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        "Contents" => Object::Reference(content_id),
        "Resources" => Object::Dictionary(resources),
    });

    let pages = doc.get_object_mut(pages_id).and_then(Object::as_dict_mut)?;
    let count = pages.get(b"Count").and_then(Object::as_i64).unwrap_or(0);
    pages.set("Count", count + 1);
    match pages.get_mut(b"Kids") {
        Ok(Object::Array(kids)) => kids.push(Object::Reference(page_id)),
        _ => {
            pages.set("Kids", vec![Object::Reference(page_id)]);
        },
    }
    Ok(page_id)
}

/// Build a minimal valid PDF with the given page sizes (points).
///
/// Intended for tests and demos that need a well-formed input document
/// without shipping fixture files.
pub fn blank_document(page_sizes: &[(f32, f32)]) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids: Vec<Object> = Vec::with_capacity(page_sizes.len());
    for &(width, height) in page_sizes {
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Contents" => Object::Reference(content_id),
            "Resources" => Object::Dictionary(Dictionary::new()),
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_sizes.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    // A 1x1 red PNG.
    pub(crate) const TINY_PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8BQDwAEhQGAhKmMIQAAAABJRU5ErkJggg==";

    #[test]
    fn test_blank_document_loads_back() {
        let bytes = blank_document(&[(612.0, 792.0), (595.0, 842.0)]).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);

        let first = pages[&1];
        assert_eq!(page_size(&doc, first), (612.0, 792.0));
        let second = pages[&2];
        assert_eq!(page_size(&doc, second), (595.0, 842.0));
    }

    #[test]
    fn test_blank_document_survives_disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, blank_document(&[(612.0, 792.0)]).unwrap()).unwrap();
        let doc = Document::load(&path).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_decode_data_url_png() {
        let url = format!("data:image/png;base64,{}", TINY_PNG_B64);
        let img = decode_data_url(&url).unwrap();
        assert_eq!(img.format, SniffedFormat::Png);
        assert_eq!((img.width, img.height), (1, 1));
    }

    #[test]
    fn test_decode_data_url_rejects_garbage() {
        assert!(decode_data_url("data:image/png;base64,!!!").is_err());
        assert!(decode_data_url("not a data url").is_err());
        // Valid base64, not an image.
        assert!(decode_data_url("data:image/png;base64,aGVsbG8=").is_err());
    }

    #[test]
    fn test_scale_to_fit_preserves_aspect() {
        // 200x100 image into a 50x50 box: scale 0.25 -> 50x25, centered.
        let (dx, dy, w, h) = scale_to_fit(200.0, 100.0, 50.0, 50.0);
        assert_eq!((w, h), (50.0, 25.0));
        assert_eq!(dx, 0.0);
        assert_eq!(dy, 12.5);
    }

    #[test]
    fn test_scale_to_fit_degenerate_input() {
        assert_eq!(scale_to_fit(0.0, 10.0, 50.0, 50.0), (0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_escape_pdf_text() {
        assert_eq!(escape_pdf_text("Hello"), "Hello");
        assert_eq!(escape_pdf_text("Hello (World)"), "Hello \\(World\\)");
        assert_eq!(escape_pdf_text("a\\b"), "a\\\\b");
        assert_eq!(escape_pdf_text("x\ny"), "x\\ny");
    }

    #[test]
    fn test_escape_pdf_text_folds_accents_to_ascii() {
        assert_eq!(escape_pdf_text("José Müller"), "Jose Muller");
        assert_eq!(escape_pdf_text("Ænes Straße"), "AEnes Strasse");
        assert_eq!(escape_pdf_text("François Nuñez"), "Francois Nunez");
    }

    #[test]
    fn test_escape_pdf_text_replaces_unmappable_characters() {
        assert_eq!(escape_pdf_text("山田太郎"), "????");
        assert!(escape_pdf_text("Olga Иванова").is_ascii());
    }

    #[test]
    fn test_append_page_grows_page_tree() {
        let bytes = blank_document(&[(612.0, 792.0)]).unwrap();
        let mut doc = Document::load_mem(&bytes).unwrap();
        append_page(&mut doc, 595.0, 842.0, Vec::new(), Dictionary::new()).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn test_register_helvetica_is_idempotent() {
        let bytes = blank_document(&[(612.0, 792.0)]).unwrap();
        let mut doc = Document::load_mem(&bytes).unwrap();
        let page = doc.get_pages()[&1];
        register_helvetica(&mut doc, page).unwrap();
        register_helvetica(&mut doc, page).unwrap();

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        let reloaded = Document::load_mem(&buffer).unwrap();
        assert_eq!(reloaded.get_pages().len(), 1);
    }
}
