mod common;

use iapkit_receipt::{ReceiptError, SignedContainer};
use iapkit_testkit::{der, pki, ReceiptPayload, SignedReceiptBuilder};
use pretty_assertions::assert_eq;

fn payload() -> Vec<u8> {
    ReceiptPayload::bound().encode()
}

#[test]
fn definite_envelope_exposes_content() {
    let content = payload();
    let raw = SignedReceiptBuilder::new(content.clone(), &pki().leaf).build();
    let container = SignedContainer::parse(&raw).unwrap();
    assert_eq!(container.content(), content.as_slice());
    assert_eq!(container.certificates().len(), 1);
    assert_eq!(container.signers().len(), 1);
}

#[test]
fn indefinite_envelope_exposes_content() {
    let content = payload();
    let raw = SignedReceiptBuilder::new(content.clone(), &pki().leaf)
        .indefinite()
        .build();
    let container = SignedContainer::parse(&raw).unwrap();
    assert_eq!(container.content(), content.as_slice());
}

#[test]
fn chunked_content_is_joined() {
    let content = payload();
    let raw = SignedReceiptBuilder::new(content.clone(), &pki().leaf)
        .indefinite()
        .chunked(7)
        .build();
    let container = SignedContainer::parse(&raw).unwrap();
    assert_eq!(container.content(), content.as_slice());
}

#[test]
fn signer_identifies_certificate() {
    let pki = pki();
    let raw = SignedReceiptBuilder::new(payload(), &pki.leaf)
        .certificates(vec![&pki.leaf, &pki.intermediate])
        .build();
    let container = SignedContainer::parse(&raw).unwrap();
    let signer = &container.signers()[0];
    assert_eq!(signer.issuer, pki.intermediate.subject.as_slice());
    assert_eq!(signer.serial, pki.leaf.serial.as_slice());
    assert!(signer.signed_attributes.is_some());
    assert_eq!(container.certificates()[1], pki.intermediate.der.as_slice());
}

#[test]
fn content_signed_without_attributes() {
    let raw = SignedReceiptBuilder::new(payload(), &pki().leaf)
        .without_signed_attributes()
        .build();
    let container = SignedContainer::parse(&raw).unwrap();
    assert!(container.signers()[0].signed_attributes.is_none());
}

#[test]
fn certificates_are_optional() {
    let raw = SignedReceiptBuilder::new(payload(), &pki().leaf)
        .certificates(vec![])
        .build();
    let container = SignedContainer::parse(&raw).unwrap();
    assert!(container.certificates().is_empty());
}

// ── Rejections ──────────────────────────────────────────────────

#[test]
fn empty_bytes_unreadable() {
    let err = SignedContainer::parse(&[]).unwrap_err();
    assert!(matches!(err, ReceiptError::ContainerUnreadable(_)));
}

#[test]
fn random_bytes_unreadable() {
    let err = SignedContainer::parse(b"not a receipt at all").unwrap_err();
    assert!(matches!(err, ReceiptError::ContainerUnreadable(_)));
}

#[test]
fn bare_payload_unreadable() {
    let err = SignedContainer::parse(&payload()).unwrap_err();
    assert!(matches!(err, ReceiptError::ContainerUnreadable(_)));
}

#[test]
fn truncated_envelope_unreadable() {
    let raw = SignedReceiptBuilder::new(payload(), &pki().leaf).build();
    let err = SignedContainer::parse(&raw[..raw.len() / 2]).unwrap_err();
    assert!(matches!(err, ReceiptError::ContainerUnreadable(_)));
}

#[test]
fn outer_type_must_be_signed_data() {
    let raw = SignedReceiptBuilder::new(payload(), &pki().leaf)
        .outer_content_type("1.2.840.113549.1.7.3")
        .build();
    let err = SignedContainer::parse(&raw).unwrap_err();
    assert!(matches!(err, ReceiptError::ContainerTypeMismatch(_)));
    assert!(err.to_string().contains("1.2.840.113549.1.7.3"));
}

#[test]
fn inner_type_must_be_data() {
    let raw = SignedReceiptBuilder::new(payload(), &pki().leaf)
        .inner_content_type("1.2.840.113549.1.9.16.1.4")
        .build();
    let err = SignedContainer::parse(&raw).unwrap_err();
    assert!(matches!(err, ReceiptError::ContainerTypeMismatch(_)));
}

#[test]
fn detached_content_unreadable() {
    let raw = SignedReceiptBuilder::new(payload(), &pki().leaf)
        .detached()
        .build();
    let err = SignedContainer::parse(&raw).unwrap_err();
    assert!(matches!(err, ReceiptError::ContainerUnreadable(_)));
}

#[test]
fn missing_signers_unreadable() {
    let raw = der::sequence(&[
        der::oid("1.2.840.113549.1.7.2"),
        der::context(
            0,
            &der::sequence(&[
                der::integer(1),
                der::set(&[]),
                der::sequence(&[
                    der::oid("1.2.840.113549.1.7.1"),
                    der::context(0, &der::octet_string(&payload())),
                ]),
                der::set(&[]),
            ]),
        ),
    ]);
    let err = SignedContainer::parse(&raw).unwrap_err();
    assert!(matches!(err, ReceiptError::ContainerUnreadable(_)));
}
