//! Bounded tag-length-value decoding.
//!
//! Receipts are BER: the outer envelope commonly uses indefinite lengths while the
//! attribute payload is plain DER. Everything here works on a [`Cursor`], an
//! explicit (buffer, position, upper bound) triple. A cursor never yields a byte
//! at or past its bound, so a hostile length field can at worst produce an error.
//!
//! Reading a header only moves the cursor past the identifier and length octets.
//! Moving past the content is the caller's job ([`Cursor::skip`]), which keeps
//! "descend into" and "step over" explicit at every call site.

use crate::error::{ReceiptError, ReceiptResult};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Universal tag numbers used by receipts and their envelope.
pub mod tag {
    pub const INTEGER: u32 = 0x02;
    pub const BIT_STRING: u32 = 0x03;
    pub const OCTET_STRING: u32 = 0x04;
    pub const NULL: u32 = 0x05;
    pub const OBJECT_IDENTIFIER: u32 = 0x06;
    pub const UTF8_STRING: u32 = 0x0c;
    pub const SEQUENCE: u32 = 0x10;
    pub const SET: u32 = 0x11;
    pub const IA5_STRING: u32 = 0x16;
}

/// Maximum nesting followed while sizing indefinite-length records.
const MAX_NESTING: usize = 32;

/// Maximum number of length octets accepted in the long form.
const MAX_LENGTH_OCTETS: usize = 4;

/// ASN.1 tag class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    Universal,
    Application,
    ContextSpecific,
    Private,
}

impl TagClass {
    fn from_identifier(octet: u8) -> Self {
        match octet >> 6 {
            0 => Self::Universal,
            1 => Self::Application,
            2 => Self::ContextSpecific,
            _ => Self::Private,
        }
    }
}

/// A decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Tag class.
    pub class: TagClass,
    /// Whether the record is constructed (holds nested records).
    pub constructed: bool,
    /// Tag number within its class.
    pub number: u32,
    /// Content length in bytes, excluding any end-of-contents marker.
    pub length: usize,
    /// Absolute offset of the first content byte in the cursor's buffer.
    pub content_start: usize,
    /// Whether the record was encoded with an indefinite length.
    pub indefinite: bool,
}

impl Header {
    /// Returns true if this is the universal tag `number`.
    #[must_use]
    pub fn is_universal(&self, number: u32) -> bool {
        self.class == TagClass::Universal && self.number == number
    }

    /// Returns true if this is the context-specific tag `[number]`.
    #[must_use]
    pub fn is_context(&self, number: u32) -> bool {
        self.class == TagClass::ContextSpecific && self.number == number
    }

    /// Absolute offset one past the last content byte.
    #[must_use]
    pub fn content_end(&self) -> usize {
        self.content_start + self.length
    }

    /// Absolute offset one past the whole encoding, end-of-contents included.
    fn encoded_end(&self) -> usize {
        self.content_end() + if self.indefinite { 2 } else { 0 }
    }
}

/// A position within a byte buffer together with an upper bound.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    end: usize,
}

impl<'a> Cursor<'a> {
    /// Creates a cursor over the whole buffer.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            end: buf.len(),
        }
    }

    /// Current absolute position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute upper bound.
    #[must_use]
    pub fn end(&self) -> usize {
        self.end
    }

    /// Bytes left before the bound.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    /// Returns true once the cursor sits exactly on its bound.
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.pos == self.end
    }

    /// Decodes the next record header and moves past it.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError::MalformedField`] if the header is truncated, uses an
    /// unsupported length form, or declares more content than the bound allows.
    pub fn read_header(&mut self) -> ReceiptResult<Header> {
        self.read_header_nested(0)
    }

    /// Returns the next header without moving the cursor.
    #[must_use]
    pub fn peek_header(&self) -> Option<Header> {
        let mut lookahead = *self;
        lookahead.read_header().ok()
    }

    /// Moves the cursor past the content of `header`.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError::MalformedField`] if the record does not end inside
    /// this cursor's bound or lies behind the current position.
    pub fn skip(&mut self, header: &Header) -> ReceiptResult<()> {
        let next = header.encoded_end();
        if header.content_start < self.pos || next > self.end {
            return Err(malformed("record extends past its enclosing bound"));
        }
        self.pos = next;
        Ok(())
    }

    /// Returns the content of `header` and moves past it.
    ///
    /// # Errors
    ///
    /// Same as [`Cursor::skip`].
    pub fn take(&mut self, header: &Header) -> ReceiptResult<&'a [u8]> {
        let content = self.content(header);
        self.skip(header)?;
        Ok(content)
    }

    /// Returns the content bytes of `header`.
    #[must_use]
    pub fn content(&self, header: &Header) -> &'a [u8] {
        &self.buf[header.content_start..header.content_end()]
    }

    /// Returns a cursor bounded to the content of `header`.
    #[must_use]
    pub fn enter(&self, header: &Header) -> Cursor<'a> {
        Cursor {
            buf: self.buf,
            pos: header.content_start,
            end: header.content_end(),
        }
    }

    /// Reads the next header and requires the universal tag `number`.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError::MalformedField`] on a decode failure or tag mismatch.
    pub fn expect(&mut self, number: u32) -> ReceiptResult<Header> {
        let header = self.read_header()?;
        if !header.is_universal(number) {
            return Err(malformed(format!(
                "expected universal tag {number}, found {:?} tag {}",
                header.class, header.number
            )));
        }
        Ok(header)
    }

    /// Reads one complete record, returning its header and full encoding.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError::MalformedField`] if the record cannot be decoded.
    pub fn read_tlv(&mut self) -> ReceiptResult<(Header, &'a [u8])> {
        let start = self.pos;
        let header = self.read_header()?;
        self.skip(&header)?;
        Ok((header, &self.buf[start..self.pos]))
    }

    fn byte_at(&self, pos: usize) -> ReceiptResult<u8> {
        if pos >= self.end {
            return Err(malformed("truncated record header"));
        }
        self.buf
            .get(pos)
            .copied()
            .ok_or_else(|| malformed("truncated record header"))
    }

    fn read_header_nested(&mut self, depth: usize) -> ReceiptResult<Header> {
        let mut pos = self.pos;
        let identifier = self.byte_at(pos)?;
        pos += 1;

        let class = TagClass::from_identifier(identifier);
        let constructed = identifier & 0x20 != 0;
        let mut number = u32::from(identifier & 0x1f);
        if number == 0x1f {
            number = 0;
            loop {
                let octet = self.byte_at(pos)?;
                pos += 1;
                if number > (u32::MAX >> 7) {
                    return Err(malformed("tag number overflows"));
                }
                number = (number << 7) | u32::from(octet & 0x7f);
                if octet & 0x80 == 0 {
                    break;
                }
            }
        }

        let initial = self.byte_at(pos)?;
        pos += 1;
        let (length, indefinite) = match initial {
            short if short < 0x80 => (usize::from(short), false),
            0x80 => {
                if !constructed {
                    return Err(malformed("indefinite length on a primitive record"));
                }
                (indefinite_length(self.buf, pos, self.end, depth)?, true)
            }
            0xff => return Err(malformed("reserved length octet")),
            long => {
                let count = usize::from(long & 0x7f);
                if count > MAX_LENGTH_OCTETS {
                    return Err(malformed(format!("{count} length octets")));
                }
                let mut length = 0usize;
                for _ in 0..count {
                    length = (length << 8) | usize::from(self.byte_at(pos)?);
                    pos += 1;
                }
                (length, false)
            }
        };

        if length > self.end - pos {
            return Err(malformed(format!(
                "record declares {length} bytes but only {} remain",
                self.end - pos
            )));
        }

        self.pos = pos;
        Ok(Header {
            class,
            constructed,
            number,
            length,
            content_start: pos,
            indefinite,
        })
    }
}

/// Sizes indefinite-length content by walking nested records up to the
/// end-of-contents marker.
fn indefinite_length(buf: &[u8], start: usize, end: usize, depth: usize) -> ReceiptResult<usize> {
    if depth >= MAX_NESTING {
        return Err(malformed("indefinite-length nesting too deep"));
    }
    let mut inner = Cursor {
        buf,
        pos: start,
        end,
    };
    loop {
        if inner.remaining() >= 2 && buf[inner.pos] == 0 && buf[inner.pos + 1] == 0 {
            return Ok(inner.pos - start);
        }
        let header = inner.read_header_nested(depth + 1)?;
        inner.skip(&header)?;
    }
}

/// Decodes an INTEGER record and moves the cursor past it.
///
/// # Errors
///
/// Returns [`ReceiptError::MalformedField`] if the record is not an INTEGER or does
/// not fit a signed 64-bit value.
pub fn decode_integer(cursor: &mut Cursor<'_>) -> ReceiptResult<i64> {
    let header = cursor.read_header()?;
    if !header.is_universal(tag::INTEGER) || header.constructed {
        return Err(malformed(format!("expected INTEGER, found tag {}", header.number)));
    }
    integer_from_bytes(cursor.take(&header)?)
}

/// Decodes a UTF8String or IA5String record at the start of `value`.
///
/// # Errors
///
/// Returns [`ReceiptError::MalformedField`] on any other tag, or on bytes that are
/// not valid for the tag's encoding.
pub fn decode_string(value: &[u8]) -> ReceiptResult<String> {
    let mut cursor = Cursor::new(value);
    let header = cursor.read_header()?;
    let bytes = cursor.content(&header);
    match header.number {
        tag::UTF8_STRING if header.class == TagClass::Universal => String::from_utf8(bytes.to_vec())
            .map_err(|e| malformed(format!("invalid UTF-8 string: {e}"))),
        tag::IA5_STRING if header.class == TagClass::Universal => ascii_string(bytes),
        other => Err(malformed(format!("expected a string, found tag {other}"))),
    }
}

/// Copies `value` verbatim.
#[must_use]
pub fn decode_octets(value: &[u8]) -> Vec<u8> {
    value.to_vec()
}

/// Decodes an IA5String timestamp at the start of `value`.
///
/// Accepts `YYYY-MM-DDTHH:MM:SS±HH:MM` and the `Z` suffix; the result is UTC.
///
/// # Errors
///
/// Returns [`ReceiptError::MalformedField`] on a tag mismatch or an unparsable
/// timestamp.
pub fn decode_date(value: &[u8]) -> ReceiptResult<DateTime<Utc>> {
    let mut cursor = Cursor::new(value);
    let header = cursor.read_header()?;
    if !header.is_universal(tag::IA5_STRING) {
        return Err(malformed(format!("expected IA5String date, found tag {}", header.number)));
    }
    let text = ascii_string(cursor.content(&header))?;
    parse_timestamp(&text).ok_or_else(|| malformed(format!("unparsable timestamp {text:?}")))
}

/// Parses a receipt timestamp into UTC.
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Some(naive) = text.strip_suffix('Z') {
        NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S")
            .ok()
            .map(|n| n.and_utc())
    } else {
        DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%:z")
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }
}

/// Formats OBJECT IDENTIFIER content bytes in dotted notation.
#[must_use]
pub fn format_oid(content: &[u8]) -> String {
    let mut arcs: Vec<u64> = Vec::new();
    let mut value: u64 = 0;
    for &octet in content {
        if value > (u64::MAX >> 7) {
            return hex::encode(content);
        }
        value = (value << 7) | u64::from(octet & 0x7f);
        if octet & 0x80 == 0 {
            if arcs.is_empty() {
                let first = (value / 40).min(2);
                arcs.push(first);
                arcs.push(value - first * 40);
            } else {
                arcs.push(value);
            }
            value = 0;
        }
    }
    arcs.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

fn integer_from_bytes(bytes: &[u8]) -> ReceiptResult<i64> {
    if bytes.is_empty() {
        return Err(malformed("empty INTEGER"));
    }
    if bytes.len() > 8 {
        return Err(malformed(format!("{}-byte INTEGER does not fit i64", bytes.len())));
    }
    let mut value: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
    for &octet in bytes {
        value = (value << 8) | i64::from(octet);
    }
    Ok(value)
}

fn ascii_string(bytes: &[u8]) -> ReceiptResult<String> {
    if !bytes.is_ascii() {
        return Err(malformed("non-ASCII byte in IA5String"));
    }
    Ok(bytes.iter().map(|&b| char::from(b)).collect())
}

fn malformed(detail: impl Into<String>) -> ReceiptError {
    ReceiptError::MalformedField(detail.into())
}
