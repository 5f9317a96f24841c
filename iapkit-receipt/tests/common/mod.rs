//! Shared helpers for receipt verification tests.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use iapkit_receipt::{
    AppIdentity, DeviceIdentifier, Environment, ReceiptVerifier, TrustAnchor, TrustPolicy,
};
use iapkit_testkit::{
    pki, ReceiptPayload, SignedReceiptBuilder, TEST_BUNDLE_ID, TEST_BUNDLE_VERSION, TEST_DEVICE_ID,
};

/// The test PKI root as a trust anchor.
pub fn root_anchor() -> TrustAnchor {
    TrustAnchor::from_der(pki().root.der.clone()).unwrap()
}

pub fn test_device() -> DeviceIdentifier {
    DeviceIdentifier::from_bytes(TEST_DEVICE_ID)
}

pub fn test_identity() -> AppIdentity {
    AppIdentity::new(TEST_BUNDLE_ID, TEST_BUNDLE_VERSION, test_device())
}

/// A verifier for the test app in `environment`, trusting the test root.
pub fn verifier(environment: Environment) -> ReceiptVerifier {
    ReceiptVerifier::new(
        TrustPolicy::for_environment(environment, root_anchor()),
        test_identity(),
    )
}

/// Receipt signed by the self-issued local certificate.
pub fn local_receipt(payload: &ReceiptPayload) -> Vec<u8> {
    SignedReceiptBuilder::new(payload.encode(), &pki().local).build()
}

/// Parses an RFC 3339 instant.
pub fn at(timestamp: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(timestamp)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn now() -> DateTime<Utc> {
    at("2026-03-01T12:00:00Z")
}
