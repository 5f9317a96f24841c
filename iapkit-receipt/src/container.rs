//! Signed-data envelope loading.
//!
//! A receipt is a PKCS #7 `ContentInfo` whose content is `SignedData` wrapping
//! plain `data`. This module only checks the structure and the two content types;
//! signatures are checked by [`crate::trust`].

use crate::asn1::{decode_integer, format_oid, tag, Cursor};
use crate::error::{ReceiptError, ReceiptResult};
use std::borrow::Cow;
use tracing::debug;

/// Object identifiers (DER content octets) used by the envelope.
pub(crate) mod oid {
    pub const SIGNED_DATA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02];
    pub const DATA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x01];
    pub const CONTENT_TYPE: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x03];
    pub const MESSAGE_DIGEST: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x04];

    pub const SHA1: &[u8] = &[0x2b, 0x0e, 0x03, 0x02, 0x1a];
    pub const SHA256: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];
    pub const SHA384: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02];
    pub const SHA512: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03];

    pub const RSA_ENCRYPTION: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];
    pub const SHA1_WITH_RSA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x05];
    pub const SHA256_WITH_RSA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0b];
    pub const SHA384_WITH_RSA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0c];
    pub const SHA512_WITH_RSA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0d];
}

/// Maximum nesting of constructed OCTET STRING chunks.
const MAX_CHUNK_NESTING: usize = 8;

/// One `SignerInfo` from the envelope, borrowed from the raw receipt.
#[derive(Debug, Clone)]
pub struct SignerInfo<'a> {
    /// DER of the signer certificate's issuer `Name`.
    pub issuer: &'a [u8],
    /// Content octets of the signer certificate's serial number.
    pub serial: &'a [u8],
    /// OID content octets of the digest algorithm.
    pub digest_algorithm: &'a [u8],
    /// Full `[0] IMPLICIT` encoding of the authenticated attributes, if any.
    pub signed_attributes: Option<&'a [u8]>,
    /// OID content octets of the signature algorithm.
    pub signature_algorithm: &'a [u8],
    /// Signature value.
    pub signature: &'a [u8],
}

/// A parsed signed-data envelope.
#[derive(Debug, Clone)]
pub struct SignedContainer<'a> {
    certificates: Vec<&'a [u8]>,
    signers: Vec<SignerInfo<'a>>,
    content: Cow<'a, [u8]>,
}

impl<'a> SignedContainer<'a> {
    /// Parses the envelope and checks its content types.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError::ContainerUnreadable`] if the bytes are not a
    /// signed-data envelope with embedded content, and
    /// [`ReceiptError::ContainerTypeMismatch`] if the outer type is not signed data
    /// or the inner type is not plain data.
    pub fn parse(raw: &'a [u8]) -> ReceiptResult<Self> {
        let container = parse_content_info(raw).map_err(|e| match e {
            ReceiptError::MalformedField(detail) => ReceiptError::ContainerUnreadable(detail),
            other => other,
        })?;
        debug!(
            certificates = container.certificates.len(),
            signers = container.signers.len(),
            content_len = container.content.len(),
            "Receipt container loaded"
        );
        Ok(container)
    }

    /// The encapsulated content (the attribute payload).
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// DER encodings of the embedded certificates.
    #[must_use]
    pub fn certificates(&self) -> &[&'a [u8]] {
        &self.certificates
    }

    /// The signer infos, in envelope order.
    #[must_use]
    pub fn signers(&self) -> &[SignerInfo<'a>] {
        &self.signers
    }
}

fn parse_content_info(raw: &[u8]) -> ReceiptResult<SignedContainer<'_>> {
    let mut outer = Cursor::new(raw);
    let content_info = outer.expect(tag::SEQUENCE)?;
    let mut info = outer.enter(&content_info);

    let content_type = read_oid(&mut info)?;
    if content_type != oid::SIGNED_DATA {
        return Err(ReceiptError::ContainerTypeMismatch(format!(
            "outer content type {} is not signed data",
            format_oid(content_type)
        )));
    }

    let explicit = info.read_header()?;
    if !explicit.is_context(0) {
        return Err(unreadable("signed data is not wrapped in [0]"));
    }
    let mut wrapper = info.enter(&explicit);
    let signed_data = wrapper.expect(tag::SEQUENCE)?;
    let mut body = wrapper.enter(&signed_data);

    decode_integer(&mut body)?;
    let digest_algorithms = body.expect(tag::SET)?;
    body.skip(&digest_algorithms)?;

    let encapsulated = body.expect(tag::SEQUENCE)?;
    let mut encap = body.enter(&encapsulated);
    body.skip(&encapsulated)?;

    let inner_type = read_oid(&mut encap)?;
    if inner_type != oid::DATA {
        return Err(ReceiptError::ContainerTypeMismatch(format!(
            "inner content type {} is not data",
            format_oid(inner_type)
        )));
    }
    if encap.is_at_end() {
        return Err(unreadable("receipt content is detached"));
    }
    let content_wrapper = encap.read_header()?;
    if !content_wrapper.is_context(0) {
        return Err(unreadable("encapsulated content is not wrapped in [0]"));
    }
    let content = read_octet_string(&mut encap.enter(&content_wrapper), 0)?;

    let mut certificates = Vec::new();
    if body.peek_header().is_some_and(|h| h.is_context(0)) {
        let set = body.read_header()?;
        let mut certs = body.enter(&set);
        while !certs.is_at_end() {
            let (header, der) = certs.read_tlv()?;
            if header.is_universal(tag::SEQUENCE) {
                certificates.push(der);
            }
        }
        body.skip(&set)?;
    }
    if body.peek_header().is_some_and(|h| h.is_context(1)) {
        let crls = body.read_header()?;
        body.skip(&crls)?;
    }

    let signer_set = body.expect(tag::SET)?;
    let mut signer_infos = body.enter(&signer_set);
    let mut signers = Vec::new();
    while !signer_infos.is_at_end() {
        signers.push(parse_signer_info(&mut signer_infos)?);
    }
    if signers.is_empty() {
        return Err(unreadable("envelope has no signer infos"));
    }

    Ok(SignedContainer {
        certificates,
        signers,
        content,
    })
}

fn parse_signer_info<'a>(cursor: &mut Cursor<'a>) -> ReceiptResult<SignerInfo<'a>> {
    let header = cursor.expect(tag::SEQUENCE)?;
    let mut info = cursor.enter(&header);
    cursor.skip(&header)?;

    decode_integer(&mut info)?;
    let sid = info.read_header()?;
    if !sid.is_universal(tag::SEQUENCE) {
        return Err(unreadable("only issuer-and-serial signer identifiers are supported"));
    }
    let mut issuer_and_serial = info.enter(&sid);
    info.skip(&sid)?;
    let (_, issuer) = issuer_and_serial.read_tlv()?;
    let serial = issuer_and_serial.expect(tag::INTEGER)?;
    let serial = issuer_and_serial.content(&serial);

    let digest_algorithm = read_algorithm(&mut info)?;

    let signed_attributes = if info.peek_header().is_some_and(|h| h.is_context(0)) {
        let (header, encoded) = info.read_tlv()?;
        if header.indefinite {
            return Err(unreadable("signed attributes must use a definite length"));
        }
        Some(encoded)
    } else {
        None
    };

    let signature_algorithm = read_algorithm(&mut info)?;
    let signature = info.expect(tag::OCTET_STRING)?;
    if signature.constructed {
        return Err(unreadable("constructed signature value"));
    }

    Ok(SignerInfo {
        issuer,
        serial,
        digest_algorithm,
        signed_attributes,
        signature_algorithm,
        signature: info.content(&signature),
    })
}

/// Reads an OBJECT IDENTIFIER record, returning its content octets.
pub(crate) fn read_oid<'a>(cursor: &mut Cursor<'a>) -> ReceiptResult<&'a [u8]> {
    let header = cursor.expect(tag::OBJECT_IDENTIFIER)?;
    cursor.take(&header)
}

/// Reads an `AlgorithmIdentifier`, returning the algorithm OID.
fn read_algorithm<'a>(cursor: &mut Cursor<'a>) -> ReceiptResult<&'a [u8]> {
    let header = cursor.expect(tag::SEQUENCE)?;
    let mut algorithm = cursor.enter(&header);
    cursor.skip(&header)?;
    read_oid(&mut algorithm)
}

/// Reads an OCTET STRING, joining BER constructed chunks when present.
pub(crate) fn read_octet_string<'a>(
    cursor: &mut Cursor<'a>,
    depth: usize,
) -> ReceiptResult<Cow<'a, [u8]>> {
    let header = cursor.expect(tag::OCTET_STRING)?;
    cursor.skip(&header)?;
    if !header.constructed {
        return Ok(Cow::Borrowed(cursor.content(&header)));
    }
    if depth >= MAX_CHUNK_NESTING {
        return Err(unreadable("octet string chunks nested too deeply"));
    }
    let mut chunks = cursor.enter(&header);
    let mut joined = Vec::with_capacity(header.length);
    while !chunks.is_at_end() {
        joined.extend_from_slice(&read_octet_string(&mut chunks, depth + 1)?);
    }
    Ok(Cow::Owned(joined))
}

fn unreadable(detail: &str) -> ReceiptError {
    ReceiptError::ContainerUnreadable(detail.to_string())
}
