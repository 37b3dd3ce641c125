//! Detached PKCS#7 signing of finalized artifacts.
//!
//! The signature is embedded the standard incremental-update way: a
//! signature dictionary with a zero-filled hex `Contents` placeholder and a
//! width-reserved `ByteRange` is written first, then both are patched in
//! place so the file length never changes after the digest is taken.

use chrono::Utc;
use lopdf::{dictionary, Document, Object, StringFormat};
use openssl::pkcs7::{Pkcs7, Pkcs7Flags};
use openssl::stack::Stack;
use openssl::x509::X509;
use std::sync::Arc;
use uuid::Uuid;

use crate::cert::vault::CertificateVault;
use crate::error::{Error, Result};

/// Size of the DER placeholder reserved for the PKCS#7 blob, in bytes.
const SIG_PLACEHOLDER_BYTES: usize = 8192;

/// Reserved ByteRange entry, wide enough for any offset in a file under
/// a gigabyte. Patched in place after serialization.
const BYTERANGE_RESERVED: i64 = 1_000_000_000;

/// Applies a tenant's signature to a finalized artifact.
pub trait ArtifactSigner: Send + Sync {
    /// Sign `pdf` on behalf of `tenant_id`, returning the signed bytes.
    fn sign(&self, tenant_id: Uuid, pdf: &[u8]) -> Result<Vec<u8>>;
}

/// Signer that applies no signature. Used when certificates are out of scope
/// for a deployment.
#[derive(Debug, Default, Clone)]
pub struct PassthroughSigner;

impl ArtifactSigner for PassthroughSigner {
    fn sign(&self, _tenant_id: Uuid, pdf: &[u8]) -> Result<Vec<u8>> {
        Ok(pdf.to_vec())
    }
}

/// Signer backed by the certificate vault.
///
/// A tenant without an installed certificate gets its artifact back
/// unchanged; installing a certificate is opt-in and its absence is never an
/// error. A tenant with one gets a `adbe.pkcs7.detached` signature, and any
/// failure along that path fails the finalization.
pub struct CertificateSigner {
    vault: Arc<CertificateVault>,
}

impl CertificateSigner {
    /// Create a signer over the given vault.
    pub fn new(vault: Arc<CertificateVault>) -> Self {
        Self { vault }
    }
}

impl ArtifactSigner for CertificateSigner {
    fn sign(&self, tenant_id: Uuid, pdf: &[u8]) -> Result<Vec<u8>> {
        let creds = match self.vault.credentials(tenant_id)? {
            Some(creds) => creds,
            None => {
                log::debug!("no signing certificate for tenant {}, passing artifact through", tenant_id);
                return Ok(pdf.to_vec());
            },
        };

        let mut buffer = serialize_with_placeholder(pdf)?;

        let contents_open = find_placeholder(&buffer).ok_or_else(|| {
            Error::Integrity("serialized artifact lost its signature placeholder".to_string())
        })?;
        let contents_end = contents_open + SIG_PLACEHOLDER_BYTES * 2 + 2;
        let tail_len = buffer.len() - contents_end;
        patch_byte_range(&mut buffer, &[0, contents_open as i64, contents_end as i64, tail_len as i64])?;

        // Digest input is everything outside the Contents string.
        let mut signed_bytes = Vec::with_capacity(buffer.len() - SIG_PLACEHOLDER_BYTES * 2);
        signed_bytes.extend_from_slice(&buffer[..contents_open]);
        signed_bytes.extend_from_slice(&buffer[contents_end..]);

        let mut chain = Stack::<X509>::new()
            .map_err(|e| Error::Integrity(format!("certificate chain setup failed: {}", e)))?;
        for cert in &creds.chain {
            chain
                .push(cert.clone())
                .map_err(|e| Error::Integrity(format!("certificate chain setup failed: {}", e)))?;
        }
        let pkcs7 = Pkcs7::sign(
            &creds.cert,
            &creds.pkey,
            &chain,
            &signed_bytes,
            Pkcs7Flags::DETACHED | Pkcs7Flags::BINARY,
        )
        .map_err(|e| Error::Integrity(format!("signing failed: {}", e)))?;
        let der = pkcs7
            .to_der()
            .map_err(|e| Error::Integrity(format!("signature serialization failed: {}", e)))?;
        if der.len() > SIG_PLACEHOLDER_BYTES {
            return Err(Error::Integrity(format!(
                "signature needs {} bytes but only {} are reserved",
                der.len(),
                SIG_PLACEHOLDER_BYTES
            )));
        }

        let hex = to_upper_hex(&der);
        let splice_at = contents_open + 1;
        buffer[splice_at..splice_at + hex.len()].copy_from_slice(&hex);

        log::info!("signed artifact for tenant {} ({} byte signature)", tenant_id, der.len());
        Ok(buffer)
    }
}

/// Re-serialize the document with a signature dictionary, an invisible
/// signature widget on the first page, and the AcroForm entry viewers expect.
fn serialize_with_placeholder(pdf: &[u8]) -> Result<Vec<u8>> {
    let mut doc = Document::load_mem(pdf)?;
    let first_page = doc
        .get_pages()
        .get(&1)
        .copied()
        .ok_or_else(|| Error::Pdf("artifact has no pages".to_string()))?;

    let signing_time = format!("D:{}Z", Utc::now().format("%Y%m%d%H%M%S"));
    let sig_id = doc.add_object(dictionary! {
        "Type" => "Sig",
        "Filter" => "Adobe.PPKLite",
        "SubFilter" => "adbe.pkcs7.detached",
        "Contents" => Object::String(vec![0u8; SIG_PLACEHOLDER_BYTES], StringFormat::Hexadecimal),
        "ByteRange" => vec![
            0.into(),
            BYTERANGE_RESERVED.into(),
            BYTERANGE_RESERVED.into(),
            BYTERANGE_RESERVED.into(),
        ],
        "M" => Object::string_literal(signing_time),
    });
    let widget_id = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Sig",
        "Rect" => vec![0.into(), 0.into(), 0.into(), 0.into()],
        "T" => Object::string_literal("Signature1"),
        "F" => 132,
        "P" => Object::Reference(first_page),
        "V" => Object::Reference(sig_id),
    });

    let page = doc.get_object_mut(first_page).and_then(Object::as_dict_mut)?;
    match page.get_mut(b"Annots") {
        Ok(Object::Array(annots)) => annots.push(Object::Reference(widget_id)),
        _ => page.set("Annots", vec![Object::Reference(widget_id)]),
    }

    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(Error::from)?;
    let catalog = doc.get_object_mut(catalog_id).and_then(Object::as_dict_mut)?;
    catalog.set(
        "AcroForm",
        Object::Dictionary(dictionary! {
            "Fields" => vec![Object::Reference(widget_id)],
            "SigFlags" => 3,
        }),
    );

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;
    Ok(buffer)
}

/// Offset of the `<` opening the zero-filled Contents hex string.
fn find_placeholder(buffer: &[u8]) -> Option<usize> {
    let hex_len = SIG_PLACEHOLDER_BYTES * 2;
    let window = hex_len + 2;
    if buffer.len() < window {
        return None;
    }
    (0..=buffer.len() - window).find(|&i| {
        buffer[i] == b'<'
            && buffer[i + window - 1] == b'>'
            && buffer[i + 1..i + window - 1].iter().all(|&b| b == b'0')
    })
}

/// Overwrite the reserved ByteRange array in place, padding with spaces so
/// the file length is unchanged.
fn patch_byte_range(buffer: &mut [u8], values: &[i64; 4]) -> Result<()> {
    let corrupt = || Error::Integrity("serialized artifact lost its ByteRange entry".to_string());
    let key_at = buffer
        .windows(10)
        .position(|w| w == b"/ByteRange")
        .ok_or_else(corrupt)?;
    let open = key_at
        + buffer[key_at..]
            .iter()
            .position(|&b| b == b'[')
            .ok_or_else(corrupt)?;
    let close = open
        + buffer[open..]
            .iter()
            .position(|&b| b == b']')
            .ok_or_else(corrupt)?;

    let text = format!("{} {} {} {}", values[0], values[1], values[2], values[3]);
    let slot = &mut buffer[open + 1..close];
    if text.len() > slot.len() {
        return Err(Error::Integrity("ByteRange values exceed their reserved width".to_string()));
    }
    slot[..text.len()].copy_from_slice(text.as_bytes());
    slot[text.len()..].fill(b' ');
    Ok(())
}

fn to_upper_hex(bytes: &[u8]) -> Vec<u8> {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = Vec::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(DIGITS[(b >> 4) as usize]);
        out.push(DIGITS[(b & 0x0F) as usize]);
    }
    out
}
