mod common;

use common::root_anchor;
use iapkit_receipt::{Environment, ReceiptError, SignedContainer, TrustAnchor, TrustPolicy};
use iapkit_testkit::{
    pki, test_key, DigestChoice, ReceiptPayload, Role, SignedReceiptBuilder, TestCertificate,
};

fn verify(raw: &[u8], chain_verification_required: bool) -> Result<(), ReceiptError> {
    let container = SignedContainer::parse(raw).unwrap();
    TrustPolicy::new(root_anchor(), chain_verification_required).verify(&container)
}

fn chained(builder: SignedReceiptBuilder<'static>) -> SignedReceiptBuilder<'static> {
    let pki = pki();
    builder.certificates(vec![&pki.leaf, &pki.intermediate])
}

fn leaf_builder() -> SignedReceiptBuilder<'static> {
    chained(SignedReceiptBuilder::new(
        ReceiptPayload::bound().encode(),
        &pki().leaf,
    ))
}

// ── Anchors ─────────────────────────────────────────────────────

#[test]
fn anchor_from_pem() {
    let pem = pki().root.to_pem();
    let anchor = TrustAnchor::from_bytes(pem.as_bytes()).unwrap();
    assert_eq!(anchor.der(), pki().root.der.as_slice());
}

#[test]
fn anchor_from_der_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("root.cer");
    std::fs::write(&path, &pki().root.der).unwrap();
    assert_eq!(TrustAnchor::load(&path).unwrap(), root_anchor());
}

#[test]
fn anchor_rejects_text() {
    let err = TrustAnchor::from_bytes(b"hello").unwrap_err();
    assert!(matches!(err, ReceiptError::SignatureInvalid(_)));
}

// ── Chained signatures ──────────────────────────────────────────

#[test]
fn chained_signature_verifies() {
    let raw = leaf_builder().indefinite().build();
    verify(&raw, true).unwrap();
    verify(&raw, false).unwrap();
}

#[test]
fn sha1_signature_verifies() {
    let raw = leaf_builder().digest(DigestChoice::Sha1).build();
    verify(&raw, true).unwrap();
}

#[test]
fn content_signature_without_attributes_verifies() {
    let raw = leaf_builder().without_signed_attributes().build();
    verify(&raw, true).unwrap();
}

#[test]
fn chunked_content_signature_verifies() {
    let raw = leaf_builder().indefinite().chunked(16).build();
    verify(&raw, true).unwrap();
}

#[test]
fn signer_issued_directly_by_root_verifies() {
    let pki = pki();
    let direct =
        TestCertificate::issued_by("Direct Signer", 9, test_key(9), Role::Signer, &pki.root);
    let raw = SignedReceiptBuilder::new(ReceiptPayload::bound().encode(), &direct).build();
    verify(&raw, true).unwrap();
}

#[test]
fn certificate_issued_by_end_entity_rejected() {
    let pki = pki();
    let forged =
        TestCertificate::issued_by("Forged Signer", 99, test_key(99), Role::Signer, &pki.leaf);
    let raw = SignedReceiptBuilder::new(ReceiptPayload::bound().encode(), &forged)
        .certificates(vec![&forged, &pki.leaf, &pki.intermediate])
        .build();

    let err = verify(&raw, true).unwrap_err();
    assert!(matches!(
        &err,
        ReceiptError::SignatureInvalid(detail) if detail.contains("not a certificate authority")
    ));
    verify(&raw, false).unwrap();
}

#[test]
fn root_embedded_in_chain_verifies() {
    let pki = pki();
    let raw = SignedReceiptBuilder::new(ReceiptPayload::bound().encode(), &pki.leaf)
        .certificates(vec![&pki.root, &pki.intermediate, &pki.leaf])
        .build();
    verify(&raw, true).unwrap();
}

#[test]
fn tampered_content_rejected() {
    let raw = leaf_builder().tamper().build();
    assert!(matches!(verify(&raw, true), Err(ReceiptError::SignatureInvalid(_))));
    assert!(matches!(verify(&raw, false), Err(ReceiptError::SignatureInvalid(_))));
}

#[test]
fn tampered_content_without_attributes_rejected() {
    let raw = leaf_builder().without_signed_attributes().tamper().build();
    assert!(matches!(verify(&raw, false), Err(ReceiptError::SignatureInvalid(_))));
}

#[test]
fn missing_signer_certificate_rejected() {
    let pki = pki();
    let raw = SignedReceiptBuilder::new(ReceiptPayload::bound().encode(), &pki.leaf)
        .certificates(vec![&pki.intermediate])
        .build();
    assert!(matches!(verify(&raw, false), Err(ReceiptError::SignatureInvalid(_))));
}

#[test]
fn missing_intermediate_breaks_chain() {
    let raw = SignedReceiptBuilder::new(ReceiptPayload::bound().encode(), &pki().leaf).build();
    assert!(matches!(verify(&raw, true), Err(ReceiptError::SignatureInvalid(_))));
    verify(&raw, false).unwrap();
}

// ── Environment asymmetry ───────────────────────────────────────

#[test]
fn local_signer_accepted_without_chain() {
    let raw = SignedReceiptBuilder::new(ReceiptPayload::bound().encode(), &pki().local).build();
    let container = SignedContainer::parse(&raw).unwrap();
    TrustPolicy::for_environment(Environment::Debug, root_anchor())
        .verify(&container)
        .unwrap();
}

#[test]
fn local_signer_rejected_in_store_environments() {
    let raw = SignedReceiptBuilder::new(ReceiptPayload::bound().encode(), &pki().local).build();
    let container = SignedContainer::parse(&raw).unwrap();
    for environment in [Environment::TestFlight, Environment::AppStore] {
        let err = TrustPolicy::for_environment(environment, root_anchor())
            .verify(&container)
            .unwrap_err();
        assert!(matches!(err, ReceiptError::SignatureInvalid(_)));
    }
}

#[test]
fn policy_reports_flag() {
    assert!(!TrustPolicy::for_environment(Environment::Debug, root_anchor())
        .chain_verification_required());
    assert!(TrustPolicy::for_environment(Environment::AppStore, root_anchor())
        .chain_verification_required());
}

#[test]
fn other_root_rejects_chain() {
    let raw = leaf_builder().build();
    let container = SignedContainer::parse(&raw).unwrap();
    let other = TrustAnchor::from_der(pki().local.der.clone()).unwrap();
    let err = TrustPolicy::new(other, true).verify(&container).unwrap_err();
    assert!(matches!(err, ReceiptError::SignatureInvalid(_)));
}
