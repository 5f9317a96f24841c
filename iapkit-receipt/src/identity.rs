//! Receipt identity validation.
//!
//! A receipt is bound to one app build on one device: the store hashes the
//! device identifier, a per-receipt opaque value and the bundle id, and embeds
//! the SHA-1 digest. Recomputing it locally proves the receipt was issued for
//! this installation.

use crate::attributes::{ProductSet, ReceiptFields};
use crate::error::{ReceiptError, ReceiptResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

/// Length of a device identifier in bytes.
pub const DEVICE_IDENTIFIER_LEN: usize = 16;

/// Length of the device-binding hash in bytes.
pub const RECEIPT_HASH_LEN: usize = 20;

/// Stable per-install device identifier (the vendor identifier UUID).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentifier([u8; DEVICE_IDENTIFIER_LEN]);

impl DeviceIdentifier {
    /// Creates an identifier from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; DEVICE_IDENTIFIER_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DEVICE_IDENTIFIER_LEN] {
        &self.0
    }
}

impl From<Uuid> for DeviceIdentifier {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.into_bytes())
    }
}

impl FromStr for DeviceIdentifier {
    type Err = uuid::Error;

    /// Parses a UUID in any form the `uuid` crate accepts (hyphenated or simple hex).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self::from)
    }
}

impl fmt::Display for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Uuid::from_bytes(self.0).hyphenated(), f)
    }
}

impl fmt::Debug for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceIdentifier({self})")
    }
}

/// Computes SHA-1(device identifier ++ opaque value ++ bundle id DER).
#[must_use]
pub fn compute_receipt_hash(
    device_id: &DeviceIdentifier,
    opaque_value: &[u8],
    bundle_id_raw: &[u8],
) -> [u8; RECEIPT_HASH_LEN] {
    let mut hasher = Sha1::new();
    hasher.update(device_id.as_bytes());
    hasher.update(opaque_value);
    hasher.update(bundle_id_raw);
    hasher.finalize().into()
}

/// The host application's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    /// Bundle identifier, e.g. `com.example.app`.
    pub bundle_id: String,
    /// Build version string (`CFBundleVersion`).
    pub bundle_version: String,
    /// This installation's device identifier.
    pub device_id: DeviceIdentifier,
}

impl AppIdentity {
    /// Creates an identity.
    pub fn new(
        bundle_id: impl Into<String>,
        bundle_version: impl Into<String>,
        device_id: DeviceIdentifier,
    ) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            bundle_version: bundle_version.into(),
            device_id,
        }
    }

    /// Checks that `fields` describe a receipt for this app, build and device,
    /// and that it has not expired at `now`.
    ///
    /// A receipt without an expiration date never expires.
    ///
    /// # Errors
    ///
    /// - [`ReceiptError::IncompleteReceipt`] if bundle id, version, opaque value
    ///   or hash is missing or empty
    /// - [`ReceiptError::IdentityMismatch`] if bundle id, version or hash differ
    /// - [`ReceiptError::ReceiptExpired`] if the expiration date is before `now`
    pub fn validate(
        &self,
        fields: ReceiptFields,
        now: DateTime<Utc>,
    ) -> ReceiptResult<ValidatedReceipt> {
        let bundle_id = required(fields.bundle_id.as_deref().map(str::as_bytes), "bundle_id")?;
        let bundle_id_raw = required(fields.bundle_id_raw.as_deref(), "bundle_id")?;
        let bundle_version = required(
            fields.bundle_version.as_deref().map(str::as_bytes),
            "bundle_version",
        )?;
        let opaque_value = required(fields.opaque_value.as_deref(), "opaque_value")?;
        let hash = required(fields.sha1_hash.as_deref(), "sha1_hash")?;

        if bundle_id != self.bundle_id.as_bytes() {
            return Err(ReceiptError::IdentityMismatch("bundle identifier"));
        }
        if bundle_version != self.bundle_version.as_bytes() {
            return Err(ReceiptError::IdentityMismatch("bundle version"));
        }
        let expected = compute_receipt_hash(&self.device_id, opaque_value, bundle_id_raw);
        if hash != expected.as_slice() {
            return Err(ReceiptError::IdentityMismatch("device hash"));
        }
        if let Some(expiration) = fields.expiration_date {
            if expiration < now {
                return Err(ReceiptError::ReceiptExpired(expiration));
            }
        }

        let product_ids = fields.product_ids();
        debug!(products = product_ids.len(), "Receipt identity validated");
        Ok(ValidatedReceipt {
            fields,
            product_ids,
        })
    }
}

fn required<'a>(value: Option<&'a [u8]>, field: &'static str) -> ReceiptResult<&'a [u8]> {
    value
        .filter(|bytes| !bytes.is_empty())
        .ok_or(ReceiptError::IncompleteReceipt(field))
}

/// A receipt that passed every check. Only [`AppIdentity::validate`] creates one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedReceipt {
    fields: ReceiptFields,
    product_ids: ProductSet,
}

impl ValidatedReceipt {
    /// The decoded receipt fields.
    #[must_use]
    pub fn fields(&self) -> &ReceiptFields {
        &self.fields
    }

    /// Product identifiers whose purchase the receipt proves.
    #[must_use]
    pub fn product_ids(&self) -> &ProductSet {
        &self.product_ids
    }

    /// Consumes the receipt, returning its product identifiers.
    #[must_use]
    pub fn into_product_ids(self) -> ProductSet {
        self.product_ids
    }
}
