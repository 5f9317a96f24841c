//! Host platform access.

use crate::config::AppConfig;
use crate::error::{ManagerError, ManagerResult};
use iapkit_receipt::{AppIdentity, DeviceIdentifier, ReceiptError, ReceiptResult};
use std::path::{Path, PathBuf};

/// What the manager needs from the host: the receipt and who we are.
pub trait Platform: Send + Sync {
    /// The raw receipt bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiptError::ReceiptUnreachable`] if there is no receipt.
    fn receipt_bytes(&self) -> ReceiptResult<Vec<u8>>;

    fn device_identifier(&self) -> DeviceIdentifier;

    fn bundle_identifier(&self) -> &str;

    fn bundle_version(&self) -> &str;

    /// Where the receipt lives, if it is a file.
    fn receipt_location(&self) -> Option<&Path> {
        None
    }

    /// The identity receipts are validated against.
    fn app_identity(&self) -> AppIdentity {
        AppIdentity::new(
            self.bundle_identifier(),
            self.bundle_version(),
            self.device_identifier(),
        )
    }
}

/// A platform whose receipt is a file on disk.
#[derive(Debug, Clone)]
pub struct FilePlatform {
    receipt_path: PathBuf,
    identity: AppIdentity,
}

impl FilePlatform {
    pub fn new(receipt_path: impl Into<PathBuf>, identity: AppIdentity) -> Self {
        Self {
            receipt_path: receipt_path.into(),
            identity,
        }
    }

    /// Builds a platform from the `[app]` section.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Config`] if the section lacks a bundle id, bundle
    /// version or receipt path.
    pub fn from_config(app: &AppConfig, device_id: DeviceIdentifier) -> ManagerResult<Self> {
        let missing = |key: &str| ManagerError::Config(format!("[app] {key} is not set"));
        let bundle_id = app.bundle_id.clone().ok_or_else(|| missing("bundle_id"))?;
        let bundle_version = app
            .bundle_version
            .clone()
            .ok_or_else(|| missing("bundle_version"))?;
        let receipt_path = app
            .receipt_path
            .clone()
            .ok_or_else(|| missing("receipt_path"))?;
        Ok(Self::new(
            receipt_path,
            AppIdentity::new(bundle_id, bundle_version, device_id),
        ))
    }
}

impl Platform for FilePlatform {
    fn receipt_bytes(&self) -> ReceiptResult<Vec<u8>> {
        std::fs::read(&self.receipt_path).map_err(|e| {
            ReceiptError::ReceiptUnreachable(format!("{}: {e}", self.receipt_path.display()))
        })
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

    fn receipt_location(&self) -> Option<&Path> {
        Some(&self.receipt_path)
    }

    fn app_identity(&self) -> AppIdentity {
        self.identity.clone()
    }
}
