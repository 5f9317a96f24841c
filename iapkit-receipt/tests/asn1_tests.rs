use iapkit_receipt::asn1::{
    decode_date, decode_integer, decode_octets, decode_string, format_oid, parse_timestamp, tag,
    Cursor, TagClass,
};
use iapkit_receipt::ReceiptError;
use iapkit_testkit::der;

// ── Headers ─────────────────────────────────────────────────────

#[test]
fn reads_short_form_header() {
    let bytes = der::octet_string(b"abc");
    let mut cursor = Cursor::new(&bytes);
    let header = cursor.read_header().unwrap();
    assert_eq!(header.class, TagClass::Universal);
    assert!(!header.constructed);
    assert_eq!(header.number, tag::OCTET_STRING);
    assert_eq!(header.length, 3);
    assert_eq!(cursor.content(&header), b"abc");
}

#[test]
fn reads_long_form_length() {
    let content = vec![0x41; 300];
    let bytes = der::octet_string(&content);
    assert_eq!(&bytes[1..4], &[0x82, 0x01, 0x2c]);
    let mut cursor = Cursor::new(&bytes);
    let header = cursor.read_header().unwrap();
    assert_eq!(header.length, 300);
    cursor.skip(&header).unwrap();
    assert!(cursor.is_at_end());
}

#[test]
fn rejects_five_length_octets() {
    let bytes = [0x04, 0x85, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00];
    let err = Cursor::new(&bytes).read_header().unwrap_err();
    assert!(matches!(err, ReceiptError::MalformedField(_)));
}

#[test]
fn rejects_length_past_bound() {
    let bytes = [0x04, 0x05, 0x01, 0x02];
    let err = Cursor::new(&bytes).read_header().unwrap_err();
    assert!(matches!(err, ReceiptError::MalformedField(_)));
}

#[test]
fn rejects_empty_input() {
    let err = Cursor::new(&[]).read_header().unwrap_err();
    assert!(matches!(err, ReceiptError::MalformedField(_)));
}

#[test]
fn entered_cursor_is_bounded_by_record() {
    let inner = der::octet_string(b"xy");
    let bytes = [der::sequence(&[inner]), der::null()].concat();
    let mut outer = Cursor::new(&bytes);
    let header = outer.expect(tag::SEQUENCE).unwrap();
    let mut inside = outer.enter(&header);
    let octets = inside.expect(tag::OCTET_STRING).unwrap();
    inside.skip(&octets).unwrap();
    assert!(inside.is_at_end());
    assert!(inside.read_header().is_err());

    outer.skip(&header).unwrap();
    assert_eq!(outer.expect(tag::NULL).unwrap().length, 0);
}

#[test]
fn expect_rejects_other_tags() {
    let bytes = der::null();
    let err = Cursor::new(&bytes).expect(tag::SEQUENCE).unwrap_err();
    assert!(matches!(err, ReceiptError::MalformedField(_)));
}

#[test]
fn indefinite_length_sizes_nested_records() {
    let inner = der::indefinite(0x30, &der::integer(7));
    let bytes = der::indefinite(0x30, &[inner, der::null()].concat());
    let mut cursor = Cursor::new(&bytes);
    let header = cursor.read_header().unwrap();
    assert!(header.indefinite);
    assert_eq!(header.length, bytes.len() - 4);
    cursor.skip(&header).unwrap();
    assert!(cursor.is_at_end());
}

#[test]
fn indefinite_without_terminator_fails() {
    let bytes = [0x30, 0x80, 0x05, 0x00];
    let err = Cursor::new(&bytes).read_header().unwrap_err();
    assert!(matches!(err, ReceiptError::MalformedField(_)));
}

#[test]
fn read_tlv_returns_full_encoding() {
    let first = der::utf8_string("com.example.app");
    let bytes = [first.clone(), der::null()].concat();
    let mut cursor = Cursor::new(&bytes);
    let (header, encoded) = cursor.read_tlv().unwrap();
    assert_eq!(header.number, tag::UTF8_STRING);
    assert_eq!(encoded, first.as_slice());
}

// ── Integers ────────────────────────────────────────────────────

#[test]
fn integers_round_values() {
    for value in [0, 1, 127, 128, 255, 256, 1702, -1, -129, i64::MAX, i64::MIN] {
        let bytes = der::integer(value);
        assert_eq!(decode_integer(&mut Cursor::new(&bytes)).unwrap(), value);
    }
}

#[test]
fn integer_advances_cursor() {
    let bytes = [der::integer(17), der::integer(1)].concat();
    let mut cursor = Cursor::new(&bytes);
    assert_eq!(decode_integer(&mut cursor).unwrap(), 17);
    assert_eq!(decode_integer(&mut cursor).unwrap(), 1);
    assert!(cursor.is_at_end());
}

#[test]
fn oversized_integer_rejected() {
    let bytes = der::tlv(0x02, &[0x01; 9]);
    let err = decode_integer(&mut Cursor::new(&bytes)).unwrap_err();
    assert!(matches!(err, ReceiptError::MalformedField(_)));
}

#[test]
fn empty_integer_rejected() {
    let err = decode_integer(&mut Cursor::new(&[0x02, 0x00])).unwrap_err();
    assert!(matches!(err, ReceiptError::MalformedField(_)));
}

#[test]
fn integer_wrong_tag_rejected() {
    let bytes = der::octet_string(&[0x01]);
    assert!(decode_integer(&mut Cursor::new(&bytes)).is_err());
}

// ── Strings and octets ──────────────────────────────────────────

#[test]
fn utf8_string_decodes() {
    let bytes = der::utf8_string("com.example.app");
    assert_eq!(decode_string(&bytes).unwrap(), "com.example.app");
}

#[test]
fn ia5_string_decodes() {
    let bytes = der::ia5_string("1.0");
    assert_eq!(decode_string(&bytes).unwrap(), "1.0");
}

#[test]
fn invalid_utf8_rejected() {
    let bytes = der::tlv(0x0c, &[0xff, 0xfe]);
    let err = decode_string(&bytes).unwrap_err();
    assert!(matches!(err, ReceiptError::MalformedField(_)));
}

#[test]
fn non_string_tag_rejected() {
    let bytes = der::integer(5);
    assert!(decode_string(&bytes).is_err());
}

#[test]
fn octets_are_copied_verbatim() {
    let value = [0x0c, 0x03, b'a', b'b', b'c'];
    assert_eq!(decode_octets(&value), value.to_vec());
    assert!(decode_octets(&[]).is_empty());
}

// ── Dates ───────────────────────────────────────────────────────

#[test]
fn zulu_date_parses() {
    let bytes = der::ia5_string("2026-03-01T12:00:00Z");
    let date = decode_date(&bytes).unwrap();
    assert_eq!(date.to_rfc3339(), "2026-03-01T12:00:00+00:00");
}

#[test]
fn offset_date_converts_to_utc() {
    let date = parse_timestamp("2026-03-01T14:00:00+02:00").unwrap();
    assert_eq!(date.to_rfc3339(), "2026-03-01T12:00:00+00:00");
}

#[test]
fn garbage_date_rejected() {
    assert!(parse_timestamp("yesterday").is_none());
    assert!(parse_timestamp("").is_none());
    let bytes = der::ia5_string("2026-13-45T99:00:00Z");
    assert!(matches!(
        decode_date(&bytes).unwrap_err(),
        ReceiptError::MalformedField(_)
    ));
}

#[test]
fn utf8_date_rejected() {
    let bytes = der::utf8_string("2026-03-01T12:00:00Z");
    assert!(decode_date(&bytes).is_err());
}

// ── OIDs ────────────────────────────────────────────────────────

#[test]
fn oid_formats_dotted() {
    assert_eq!(
        format_oid(&der::oid_content("1.2.840.113549.1.7.2")),
        "1.2.840.113549.1.7.2"
    );
    assert_eq!(format_oid(&der::oid_content("2.16.840.1.101.3.4.2.1")), "2.16.840.1.101.3.4.2.1");
}
