//! Minimal DER encoder.

/// Universal tags (identifier octets).
pub mod tag {
    pub const INTEGER: u8 = 0x02;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const OBJECT_IDENTIFIER: u8 = 0x06;
    pub const UTF8_STRING: u8 = 0x0c;
    pub const IA5_STRING: u8 = 0x16;
    pub const SEQUENCE: u8 = 0x30;
    pub const SET: u8 = 0x31;
}

/// Encodes a length in the shortest definite form.
#[must_use]
pub fn encode_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    let mut out = vec![0x80 | (bytes.len() - skip) as u8];
    out.extend_from_slice(&bytes[skip..]);
    out
}

/// Encodes one tag-length-value record with a single identifier octet.
#[must_use]
pub fn tlv(identifier: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![identifier];
    out.extend(encode_length(content.len()));
    out.extend_from_slice(content);
    out
}

/// Encodes a constructed record with an indefinite length and end-of-contents.
#[must_use]
pub fn indefinite(identifier: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![identifier, 0x80];
    out.extend_from_slice(content);
    out.extend_from_slice(&[0x00, 0x00]);
    out
}

/// Encodes a constructed record, definite or indefinite.
#[must_use]
pub fn constructed(identifier: u8, content: &[u8], indefinite_length: bool) -> Vec<u8> {
    if indefinite_length {
        indefinite(identifier, content)
    } else {
        tlv(identifier, content)
    }
}

#[must_use]
pub fn sequence(parts: &[Vec<u8>]) -> Vec<u8> {
    tlv(tag::SEQUENCE, &parts.concat())
}

#[must_use]
pub fn set(parts: &[Vec<u8>]) -> Vec<u8> {
    tlv(tag::SET, &parts.concat())
}

/// Context-specific constructed `[n]` record.
#[must_use]
pub fn context(number: u8, content: &[u8]) -> Vec<u8> {
    tlv(0xa0 | number, content)
}

/// Minimal two's-complement INTEGER.
#[must_use]
pub fn integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    tlv(tag::INTEGER, &bytes[start..])
}

#[must_use]
pub fn octet_string(bytes: &[u8]) -> Vec<u8> {
    tlv(tag::OCTET_STRING, bytes)
}

#[must_use]
pub fn utf8_string(text: &str) -> Vec<u8> {
    tlv(tag::UTF8_STRING, text.as_bytes())
}

#[must_use]
pub fn ia5_string(text: &str) -> Vec<u8> {
    tlv(tag::IA5_STRING, text.as_bytes())
}

#[must_use]
pub fn null() -> Vec<u8> {
    vec![tag::NULL, 0x00]
}

/// OBJECT IDENTIFIER content octets from dotted notation.
///
/// # Panics
///
/// Panics on a malformed dotted string.
#[must_use]
pub fn oid_content(dotted: &str) -> Vec<u8> {
    let arcs: Vec<u64> = dotted
        .split('.')
        .map(|arc| arc.parse().expect("numeric OID arc"))
        .collect();
    assert!(arcs.len() >= 2, "OID needs at least two arcs");

    let mut out = Vec::new();
    let mut push_arc = |mut value: u64| {
        let mut chunk = vec![(value & 0x7f) as u8];
        value >>= 7;
        while value > 0 {
            chunk.push(0x80 | (value & 0x7f) as u8);
            value >>= 7;
        }
        chunk.reverse();
        out.extend(chunk);
    };
    push_arc(arcs[0] * 40 + arcs[1]);
    for &arc in &arcs[2..] {
        push_arc(arc);
    }
    out
}

#[must_use]
pub fn oid(dotted: &str) -> Vec<u8> {
    tlv(tag::OBJECT_IDENTIFIER, &oid_content(dotted))
}

/// `AlgorithmIdentifier` with NULL parameters.
#[must_use]
pub fn algorithm(dotted: &str) -> Vec<u8> {
    sequence(&[oid(dotted), null()])
}
