//! Error types for entitlement management.

use crate::remote::ReceiptStatus;
use iapkit_receipt::ReceiptError;
use iapkit_store::StoreError;
use thiserror::Error;

/// Entitlement manager errors.
///
/// Any error means no purchase was proven; entitlement state is left as it was.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Receipt(#[from] ReceiptError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The remote validator answered with a non-valid status.
    #[error("remote validation rejected the receipt: {0}")]
    RemoteRejected(ReceiptStatus),

    /// The remote validator could not be reached or answered garbage.
    #[error("remote validation failed: {0}")]
    Remote(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    /// A thread panicked while holding the entitlement lock.
    #[error("entitlement state lock poisoned")]
    Lock,
}

/// Result type for manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;
