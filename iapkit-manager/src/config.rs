//! Manager configuration.
//!
//! ```toml
//! environment = "appstore"      # debug | testflight | appstore; detected when absent
//! local_validation = true
//!
//! [trust]
//! root_certificate = "AppleIncRootCertificate.cer"
//! # chain_verification_required = true
//!
//! [app]
//! bundle_id = "com.example.app"
//! bundle_version = "1.0"
//! receipt_path = "receipt"
//!
//! [remote]
//! shared_secret = "..."
//! ```

use crate::error::{ManagerError, ManagerResult};
use iapkit_receipt::{Environment, TrustAnchor, TrustPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

fn default_true() -> bool {
    true
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Fixed environment; detected from the build and receipt path when absent.
    #[serde(default)]
    pub environment: Option<Environment>,
    /// Verify receipts on device rather than through the remote validator.
    #[serde(default = "default_true")]
    pub local_validation: bool,
    pub trust: TrustConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Trust root selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustConfig {
    /// DER or PEM root certificate.
    pub root_certificate: PathBuf,
    /// Overrides the environment's chain-verification default.
    #[serde(default)]
    pub chain_verification_required: Option<bool>,
}

/// Host application identity and receipt location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub bundle_id: Option<String>,
    pub bundle_version: Option<String>,
    pub receipt_path: Option<PathBuf>,
}

/// Remote validation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// App-specific shared secret sent as `password`.
    #[serde(default)]
    pub shared_secret: String,
}

impl ManagerConfig {
    /// A local-validation config trusting `root_certificate`.
    pub fn new(root_certificate: impl Into<PathBuf>) -> Self {
        Self {
            environment: None,
            local_validation: true,
            trust: TrustConfig {
                root_certificate: root_certificate.into(),
                chain_verification_required: None,
            },
            app: AppConfig::default(),
            remote: RemoteConfig::default(),
        }
    }

    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Toml`] on invalid TOML or unknown values.
    pub fn from_toml_str(text: &str) -> ManagerResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML file. Relative certificate and receipt paths are
    /// resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Io`] if the file cannot be read and
    /// [`ManagerError::Toml`] if it does not parse.
    pub fn load(path: impl AsRef<Path>) -> ManagerResult<Self> {
        let path = path.as_ref();
        let mut config = Self::from_toml_str(&std::fs::read_to_string(path)?)?;
        if let Some(base) = path.parent() {
            config.trust.root_certificate = base.join(&config.trust.root_certificate);
            if let Some(receipt) = config.app.receipt_path.take() {
                config.app.receipt_path = Some(base.join(receipt));
            }
        }
        debug!(path = %path.display(), "Manager configuration loaded");
        Ok(config)
    }

    /// The configured environment, or the one detected for this build.
    #[must_use]
    pub fn environment(&self, debug_build: bool) -> Environment {
        self.environment.unwrap_or_else(|| {
            let receipt = self.app.receipt_path.as_deref().unwrap_or(Path::new(""));
            Environment::detect(receipt, debug_build)
        })
    }

    /// Loads the root certificate and builds the policy for `environment`.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::Receipt`] if the root certificate is unusable.
    pub fn trust_policy(&self, environment: Environment) -> ManagerResult<TrustPolicy> {
        let root = TrustAnchor::load(&self.trust.root_certificate)?;
        let chain = self
            .trust
            .chain_verification_required
            .unwrap_or_else(|| environment.requires_chain_verification());
        Ok(TrustPolicy::new(root, chain))
    }
}
