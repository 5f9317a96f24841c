//! Offline verification of signed App Store purchase receipts.
//!
//! This crate handles:
//! - Decoding the PKCS #7 signed-data envelope around a receipt
//! - Verifying the envelope signature against a single trusted root
//! - Walking the receipt's attribute records, including nested purchases
//! - Checking the receipt is bound to this app, build and device
//!
//! # Design Principles
//!
//! - **Fail closed**: every malformed, truncated or unexpected input is an error
//! - **Bounded decoding**: all parsing goes through a cursor that cannot read past
//!   its bound
//! - **Explicit trust policy**: chain verification is a configuration value, not a
//!   build flag, so both paths run in one binary
//!
//! # Pipeline
//!
//! `SignedContainer::parse` → `TrustPolicy::verify` → `ReceiptFields::from_payload`
//! → `AppIdentity::validate`, wrapped by [`ReceiptVerifier`].

pub mod asn1;
mod attributes;
mod container;
mod error;
mod identity;
mod trust;
mod verifier;

pub use attributes::{
    attribute_type, in_app_type, walk_attributes, AttributeRecord, InAppPurchase, ProductId,
    ProductSet, ReceiptAttribute, ReceiptFields,
};
pub use container::{SignedContainer, SignerInfo};
pub use error::{ReceiptError, ReceiptResult};
pub use identity::{
    compute_receipt_hash, AppIdentity, DeviceIdentifier, ValidatedReceipt, DEVICE_IDENTIFIER_LEN,
    RECEIPT_HASH_LEN,
};
pub use trust::{Environment, TrustAnchor, TrustPolicy, SANDBOX_RECEIPT_NAME};
pub use verifier::ReceiptVerifier;
