//! Remote receipt validation contract.
//!
//! When local validation is off the manager posts the base64 receipt to the
//! store's validation endpoint and trusts its verdict. Only status `0` proves a
//! purchase; every other status leaves entitlements untouched.

use crate::error::ManagerResult;
use base64::Engine as _;
use iapkit_receipt::{Environment, ProductId, ProductSet};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Endpoint for sandbox receipts.
pub const SANDBOX_URL: &str = "https://sandbox.itunes.apple.com/verifyReceipt";

/// Endpoint for production receipts.
pub const PRODUCTION_URL: &str = "https://buy.itunes.apple.com/verifyReceipt";

/// The validation endpoint serving `environment`.
#[must_use]
pub fn endpoint(environment: Environment) -> &'static str {
    if environment.is_sandbox() {
        SANDBOX_URL
    } else {
        PRODUCTION_URL
    }
}

/// Status code in a validation response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ReceiptStatus {
    /// A code this client does not know.
    Unknown,
    /// The response carried no status.
    #[default]
    None,
    Valid,
    JsonNotReadable,
    MalformedOrMissingData,
    NotAuthenticated,
    SharedSecretMismatch,
    ServerUnavailable,
    SubscriptionExpired,
    SandboxReceiptSentToProduction,
    ProductionReceiptSentToSandbox,
}

impl ReceiptStatus {
    /// Maps a wire code; unrecognised codes become [`ReceiptStatus::Unknown`].
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            -1 => Self::None,
            0 => Self::Valid,
            21000 => Self::JsonNotReadable,
            21002 => Self::MalformedOrMissingData,
            21003 => Self::NotAuthenticated,
            21004 => Self::SharedSecretMismatch,
            21005 => Self::ServerUnavailable,
            21006 => Self::SubscriptionExpired,
            21007 => Self::SandboxReceiptSentToProduction,
            21008 => Self::ProductionReceiptSentToSandbox,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Unknown => -2,
            Self::None => -1,
            Self::Valid => 0,
            Self::JsonNotReadable => 21000,
            Self::MalformedOrMissingData => 21002,
            Self::NotAuthenticated => 21003,
            Self::SharedSecretMismatch => 21004,
            Self::ServerUnavailable => 21005,
            Self::SubscriptionExpired => 21006,
            Self::SandboxReceiptSentToProduction => 21007,
            Self::ProductionReceiptSentToSandbox => 21008,
        }
    }

    #[must_use]
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }
}

impl From<i64> for ReceiptStatus {
    fn from(code: i64) -> Self {
        Self::from_code(code)
    }
}

impl From<ReceiptStatus> for i64 {
    fn from(status: ReceiptStatus) -> Self {
        status.code()
    }
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Unknown => "unknown status",
            Self::None => "no status",
            Self::Valid => "valid",
            Self::JsonNotReadable => "request JSON not readable",
            Self::MalformedOrMissingData => "receipt data malformed or missing",
            Self::NotAuthenticated => "receipt could not be authenticated",
            Self::SharedSecretMismatch => "shared secret does not match",
            Self::ServerUnavailable => "receipt server unavailable",
            Self::SubscriptionExpired => "subscription expired",
            Self::SandboxReceiptSentToProduction => "sandbox receipt sent to production",
            Self::ProductionReceiptSentToSandbox => "production receipt sent to sandbox",
        };
        write!(f, "{text} ({})", self.code())
    }
}

/// Body posted to the validation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteValidationRequest {
    #[serde(rename = "receipt-data")]
    pub receipt_data: String,
    pub password: String,
}

impl RemoteValidationRequest {
    pub fn new(receipt: &[u8], shared_secret: impl Into<String>) -> Self {
        Self {
            receipt_data: base64::engine::general_purpose::STANDARD.encode(receipt),
            password: shared_secret.into(),
        }
    }
}

/// One in-app entry of a validation response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RemoteInAppPurchase {
    #[serde(default)]
    pub product_id: Option<ProductId>,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

/// The decoded receipt echoed in a validation response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RemoteReceipt {
    #[serde(default)]
    pub bundle_id: Option<String>,
    #[serde(default)]
    pub in_app: Vec<RemoteInAppPurchase>,
}

/// Body returned by the validation endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RemoteValidationResponse {
    #[serde(default)]
    pub status: ReceiptStatus,
    /// Base64 of the latest receipt, for subscriptions.
    #[serde(default)]
    pub latest_receipt: Option<String>,
    #[serde(default)]
    pub receipt: Option<RemoteReceipt>,
    #[serde(default)]
    pub latest_receipt_info: Vec<RemoteInAppPurchase>,
}

impl RemoteValidationResponse {
    /// Every product id named by the receipt or the latest transactions.
    #[must_use]
    pub fn product_ids(&self) -> ProductSet {
        self.receipt
            .iter()
            .flat_map(|receipt| receipt.in_app.iter())
            .chain(self.latest_receipt_info.iter())
            .filter_map(|purchase| purchase.product_id.clone())
            .collect()
    }
}

/// Something that can validate a receipt remotely.
pub trait RemoteValidator: Send + Sync {
    /// Submits `request` to the endpoint for `environment`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ManagerError::Remote`] if no verdict was obtained.
    fn validate(
        &self,
        environment: Environment,
        request: &RemoteValidationRequest,
    ) -> ManagerResult<RemoteValidationResponse>;
}

#[cfg(feature = "online")]
pub use http::HttpRemoteValidator;

#[cfg(feature = "online")]
mod http {
    use super::{endpoint, RemoteValidationRequest, RemoteValidationResponse, RemoteValidator};
    use crate::error::{ManagerError, ManagerResult};
    use iapkit_receipt::Environment;
    use std::time::Duration;
    use tracing::debug;

    /// Posts receipts to the store endpoints over HTTPS.
    #[derive(Debug, Clone)]
    pub struct HttpRemoteValidator {
        client: reqwest::blocking::Client,
    }

    impl HttpRemoteValidator {
        /// # Errors
        ///
        /// Returns [`ManagerError::Remote`] if the HTTP client cannot be built.
        pub fn new() -> ManagerResult<Self> {
            let client = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(30))
                .user_agent(concat!("iapkit/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| ManagerError::Remote(format!("http client: {e}")))?;
            Ok(Self { client })
        }
    }

    impl RemoteValidator for HttpRemoteValidator {
        fn validate(
            &self,
            environment: Environment,
            request: &RemoteValidationRequest,
        ) -> ManagerResult<RemoteValidationResponse> {
            let url = endpoint(environment);
            debug!(url, %environment, "Submitting receipt for remote validation");
            let resp = self
                .client
                .post(url)
                .json(request)
                .send()
                .map_err(|e| ManagerError::Remote(format!("request failed: {e}")))?;
            if !resp.status().is_success() {
                return Err(ManagerError::Remote(format!(
                    "HTTP {} from {url}",
                    resp.status()
                )));
            }
            resp.json()
                .map_err(|e| ManagerError::Remote(format!("unreadable response: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for code in [-2, -1, 0, 21000, 21002, 21003, 21004, 21005, 21006, 21007, 21008] {
            assert_eq!(ReceiptStatus::from_code(code).code(), code);
        }
        assert_eq!(ReceiptStatus::from_code(21001), ReceiptStatus::Unknown);
        assert_eq!(ReceiptStatus::from_code(-2), ReceiptStatus::Unknown);
    }

    #[test]
    fn only_zero_is_valid() {
        assert!(ReceiptStatus::Valid.is_valid());
        assert!(!ReceiptStatus::SubscriptionExpired.is_valid());
        assert!(!ReceiptStatus::None.is_valid());
    }

    #[test]
    fn endpoints_by_environment() {
        assert_eq!(endpoint(Environment::Debug), SANDBOX_URL);
        assert_eq!(endpoint(Environment::TestFlight), SANDBOX_URL);
        assert_eq!(endpoint(Environment::AppStore), PRODUCTION_URL);
    }
}
