//! The entitlement manager.

use crate::config::ManagerConfig;
use crate::error::{ManagerError, ManagerResult};
use crate::platform::Platform;
use crate::reconcile::{reconcile, Reconciliation};
use crate::remote::{RemoteValidationRequest, RemoteValidator};
use chrono::{DateTime, Utc};
use iapkit_receipt::{Environment, ProductSet, ReceiptVerifier, TrustPolicy};
use iapkit_store::EntitlementStore;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// How receipts are checked.
enum Validation {
    Local(TrustPolicy),
    Remote {
        validator: Box<dyn RemoteValidator>,
        shared_secret: String,
    },
}

/// Owns the purchased-product set and keeps it in step with the receipt.
///
/// Runs are single-flight: one mutex guards the whole pipeline and the
/// reconciliation, and every read takes the same lock.
pub struct EntitlementManager<P, S> {
    platform: P,
    store: S,
    environment: Environment,
    validation: Validation,
    purchased: Mutex<ProductSet>,
}

impl<P: Platform, S: EntitlementStore> EntitlementManager<P, S> {
    /// A manager validating receipts locally under `policy`.
    pub fn new(platform: P, store: S, environment: Environment, policy: TrustPolicy) -> Self {
        Self {
            platform,
            store,
            environment,
            validation: Validation::Local(policy),
            purchased: Mutex::new(ProductSet::new()),
        }
    }

    /// A manager delegating validation to `validator`.
    pub fn with_remote_validator(
        platform: P,
        store: S,
        environment: Environment,
        validator: Box<dyn RemoteValidator>,
        shared_secret: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            store,
            environment,
            validation: Validation::Remote {
                validator,
                shared_secret: shared_secret.into(),
            },
            purchased: Mutex::new(ProductSet::new()),
        }
    }

    /// Builds a manager from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Receipt`] if the root certificate is unusable, and
    /// [`ManagerError::Config`] if remote validation is requested in a build
    /// without network support.
    pub fn from_config(
        config: &ManagerConfig,
        platform: P,
        store: S,
        debug_build: bool,
    ) -> ManagerResult<Self> {
        let environment = match (config.environment, platform.receipt_location()) {
            (Some(environment), _) => environment,
            (None, Some(path)) => Environment::detect(path, debug_build),
            (None, None) => config.environment(debug_build),
        };
        info!(%environment, local = config.local_validation, "Entitlement manager configured");

        if config.local_validation {
            let policy = config.trust_policy(environment)?;
            return Ok(Self::new(platform, store, environment, policy));
        }
        Self::remote_from_config(config, platform, store, environment)
    }

    #[cfg(feature = "online")]
    fn remote_from_config(
        config: &ManagerConfig,
        platform: P,
        store: S,
        environment: Environment,
    ) -> ManagerResult<Self> {
        let validator = crate::remote::HttpRemoteValidator::new()?;
        Ok(Self::with_remote_validator(
            platform,
            store,
            environment,
            Box::new(validator),
            config.remote.shared_secret.clone(),
        ))
    }

    #[cfg(not(feature = "online"))]
    fn remote_from_config(
        _config: &ManagerConfig,
        _platform: P,
        _store: S,
        _environment: Environment,
    ) -> ManagerResult<Self> {
        Err(ManagerError::Config(
            "remote validation requires the `online` feature".to_string(),
        ))
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    fn lock(&self) -> ManagerResult<MutexGuard<'_, ProductSet>> {
        self.purchased.lock().map_err(|_| ManagerError::Lock)
    }

    /// Seeds the in-memory set from the store, checking `known` product ids.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Store`] if the store cannot be read.
    pub fn load_persisted(&self, known: &ProductSet) -> ManagerResult<ProductSet> {
        let mut purchased = self.lock()?;
        let loaded = self.store.load_purchased(known)?;
        debug!(products = loaded.len(), "Loaded persisted entitlements");
        *purchased = loaded.clone();
        Ok(loaded)
    }

    /// Validates the current receipt and reconciles entitlements with it.
    ///
    /// # Errors
    ///
    /// Returns the first failure; entitlements are then unchanged.
    pub fn process_receipt(&self) -> ManagerResult<Reconciliation> {
        self.process_receipt_at(Utc::now())
    }

    /// [`Self::process_receipt`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns the first failure; entitlements are then unchanged.
    pub fn process_receipt_at(&self, now: DateTime<Utc>) -> ManagerResult<Reconciliation> {
        let mut purchased = self.lock()?;
        info!(environment = %self.environment, "Receipt validation started");

        let validated = match self.validated_products(now) {
            Ok(products) => products,
            Err(e) => {
                warn!(error = %e, "Receipt processing failed");
                return Err(e);
            }
        };

        let outcome = reconcile(&mut purchased, validated, &self.store)?;
        match &outcome {
            Reconciliation::Unchanged => {
                info!(products = purchased.len(), "Entitlements already match the receipt");
            }
            Reconciliation::Updated { added, removed } => info!(
                added = added.len(),
                removed = removed.len(),
                products = purchased.len(),
                "Entitlements updated from the receipt"
            ),
        }
        Ok(outcome)
    }

    fn validated_products(&self, now: DateTime<Utc>) -> ManagerResult<ProductSet> {
        let raw = self.platform.receipt_bytes()?;
        match &self.validation {
            Validation::Local(policy) => {
                let verifier = ReceiptVerifier::new(policy.clone(), self.platform.app_identity());
                Ok(verifier.verify_at(&raw, now)?.into_product_ids())
            }
            Validation::Remote {
                validator,
                shared_secret,
            } => {
                let request = RemoteValidationRequest::new(&raw, shared_secret.as_str());
                let response = validator.validate(self.environment, &request)?;
                if !response.status.is_valid() {
                    return Err(ManagerError::RemoteRejected(response.status));
                }
                Ok(response.product_ids())
            }
        }
    }

    /// The current purchased-product set.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Lock`] if the state lock is poisoned.
    pub fn purchased_product_ids(&self) -> ManagerResult<ProductSet> {
        Ok(self.lock()?.clone())
    }

    /// Whether `product_id` is currently purchased.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Lock`] if the state lock is poisoned.
    pub fn is_purchased(&self, product_id: &str) -> ManagerResult<bool> {
        Ok(self.lock()?.contains(product_id))
    }
}
