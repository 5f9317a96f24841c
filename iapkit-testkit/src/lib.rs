//! Fixture builders for receipt tests.
//!
//! Everything here produces real encodings: receipt DER built byte by byte, RSA
//! keys generated from fixed seeds, certificates issued with `rcgen` and receipts
//! wrapped in a genuine signed-data envelope. Nothing depends on the verifier
//! crates, so a fixture can never agree with a decoder bug.
//!
//! Not for production use.

pub mod cert;
pub mod der;
pub mod receipt;

pub use cert::{pki, test_key, Role, TestCertificate, TestPki};
pub use receipt::{
    attribute_record, device_hash, store_receipt, DigestChoice, InAppRecord, ReceiptPayload,
    SignedReceiptBuilder, TEST_BUNDLE_ID, TEST_BUNDLE_VERSION, TEST_DEVICE_ID, TEST_OPAQUE_VALUE,
};
