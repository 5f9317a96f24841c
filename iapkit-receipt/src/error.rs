//! Error types for receipt verification.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Receipt verification errors.
///
/// Every variant is terminal for the current validation run. Callers treat any of
/// them as "no purchase proven" and leave persisted entitlements untouched.
#[derive(Debug, Error)]
pub enum ReceiptError {
    /// The receipt bytes could not be obtained from the platform.
    #[error("receipt unreachable: {0}")]
    ReceiptUnreachable(String),

    /// The bytes do not parse as a signed-data envelope.
    #[error("receipt container unreadable: {0}")]
    ContainerUnreadable(String),

    /// The envelope is not signed data wrapping plain data.
    #[error("receipt container type mismatch: {0}")]
    ContainerTypeMismatch(String),

    /// Signature, certificate or trust chain verification failed.
    #[error("receipt signature invalid: {0}")]
    SignatureInvalid(String),

    /// The attribute set is structurally broken.
    #[error("malformed receipt payload: {0}")]
    MalformedPayload(String),

    /// A single TLV field could not be decoded.
    #[error("malformed receipt field: {0}")]
    MalformedField(String),

    /// A field required for identity validation is missing.
    #[error("incomplete receipt: missing {0}")]
    IncompleteReceipt(&'static str),

    /// The receipt belongs to another app, build or device.
    #[error("receipt identity mismatch: {0}")]
    IdentityMismatch(&'static str),

    /// The receipt expiration date has passed.
    #[error("receipt expired on {0}")]
    ReceiptExpired(DateTime<Utc>),
}

/// Result type for receipt operations.
pub type ReceiptResult<T> = Result<T, ReceiptError>;
