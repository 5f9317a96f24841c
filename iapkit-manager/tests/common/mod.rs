//! Shared helpers for manager tests.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use iapkit_manager::{EntitlementManager, Platform};
use iapkit_receipt::{
    AppIdentity, DeviceIdentifier, Environment, ReceiptError, ReceiptResult, TrustAnchor,
    TrustPolicy,
};
use iapkit_store::MemoryStore;
use iapkit_testkit::{
    pki, store_receipt, InAppRecord, ReceiptPayload, TEST_BUNDLE_ID, TEST_BUNDLE_VERSION,
    TEST_DEVICE_ID,
};
use std::sync::Mutex;

/// A platform whose receipt can be swapped between runs.
pub struct TestPlatform {
    receipt: Mutex<Option<Vec<u8>>>,
    identity: AppIdentity,
}

impl TestPlatform {
    pub fn new(receipt: Option<Vec<u8>>) -> Self {
        Self {
            receipt: Mutex::new(receipt),
            identity: AppIdentity::new(
                TEST_BUNDLE_ID,
                TEST_BUNDLE_VERSION,
                DeviceIdentifier::from_bytes(TEST_DEVICE_ID),
            ),
        }
    }

    pub fn set_receipt(&self, receipt: Option<Vec<u8>>) {
        *self.receipt.lock().unwrap() = receipt;
    }
}

impl Platform for TestPlatform {
    fn receipt_bytes(&self) -> ReceiptResult<Vec<u8>> {
        self.receipt
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ReceiptError::ReceiptUnreachable("no receipt installed".into()))
    }

    fn device_identifier(&self) -> DeviceIdentifier {
        self.identity.device_id
    }

    fn bundle_identifier(&self) -> &str {
        &self.identity.bundle_id
    }

    fn bundle_version(&self) -> &str {
        &self.identity.bundle_version
    }
}

/// A store-signed receipt proving `products`.
pub fn receipt_for(products: &[&str]) -> Vec<u8> {
    let payload = products
        .iter()
        .fold(ReceiptPayload::bound(), |payload, product| {
            payload.in_app(&InAppRecord::product(product))
        });
    store_receipt(&payload)
}

pub fn root_policy() -> TrustPolicy {
    TrustPolicy::for_environment(
        Environment::AppStore,
        TrustAnchor::from_der(pki().root.der.clone()).unwrap(),
    )
}

pub fn local_manager(receipt: Option<Vec<u8>>) -> EntitlementManager<TestPlatform, MemoryStore> {
    EntitlementManager::new(
        TestPlatform::new(receipt),
        MemoryStore::new(),
        Environment::AppStore,
        root_policy(),
    )
}

pub fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn products(ids: &[&str]) -> iapkit_receipt::ProductSet {
    ids.iter().map(|id| (*id).to_string()).collect()
}
