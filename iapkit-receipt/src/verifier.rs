//! The verification pipeline.

use crate::attributes::ReceiptFields;
use crate::container::SignedContainer;
use crate::error::ReceiptResult;
use crate::identity::{AppIdentity, ValidatedReceipt};
use crate::trust::TrustPolicy;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Runs load → signature → attributes → identity over raw receipt bytes.
///
/// Holds no state between runs; each call decodes its receipt from scratch.
#[derive(Debug, Clone)]
pub struct ReceiptVerifier {
    policy: TrustPolicy,
    identity: AppIdentity,
}

impl ReceiptVerifier {
    /// Creates a verifier.
    #[must_use]
    pub fn new(policy: TrustPolicy, identity: AppIdentity) -> Self {
        Self { policy, identity }
    }

    /// The trust policy in use.
    #[must_use]
    pub fn policy(&self) -> &TrustPolicy {
        &self.policy
    }

    /// The host identity receipts are checked against.
    #[must_use]
    pub fn identity(&self) -> &AppIdentity {
        &self.identity
    }

    /// Verifies a receipt against the current time.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that fails.
    pub fn verify(&self, raw: &[u8]) -> ReceiptResult<ValidatedReceipt> {
        self.verify_at(raw, Utc::now())
    }

    /// Verifies a receipt as of `now`.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that fails.
    pub fn verify_at(&self, raw: &[u8], now: DateTime<Utc>) -> ReceiptResult<ValidatedReceipt> {
        let outcome = decode_signed(&self.policy, raw)
            .and_then(|fields| self.identity.validate(fields, now));
        match &outcome {
            Ok(receipt) => info!(
                products = receipt.product_ids().len(),
                "Receipt validation succeeded"
            ),
            Err(e) => warn!(error = %e, "Receipt validation failed"),
        }
        outcome
    }

    /// Loads, authenticates and decodes a receipt without identity checks.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that fails.
    pub fn decode(&self, raw: &[u8]) -> ReceiptResult<ReceiptFields> {
        decode_signed(&self.policy, raw)
    }
}

fn decode_signed(policy: &TrustPolicy, raw: &[u8]) -> ReceiptResult<ReceiptFields> {
    let container = SignedContainer::parse(raw)?;
    policy.verify(&container)?;
    ReceiptFields::from_payload(container.content())
}
