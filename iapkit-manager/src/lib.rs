//! Purchase entitlement management.
//!
//! This crate handles:
//! - Running the receipt verification pipeline against the host platform
//! - Reconciling the validated product set with persisted entitlements
//! - Optional remote validation through the store's endpoint
//! - Configuration loading
//!
//! # Design Principles
//!
//! - **Single flight**: one lock covers validation and reconciliation
//! - **No partial state**: a failed run changes nothing, in memory or on disk
//! - **Idempotent**: re-processing an unchanged receipt writes nothing

mod config;
mod error;
mod manager;
mod platform;
mod reconcile;
pub mod remote;

pub use config::{AppConfig, ManagerConfig, RemoteConfig, TrustConfig};
pub use error::{ManagerError, ManagerResult};
pub use manager::EntitlementManager;
pub use platform::{FilePlatform, Platform};
pub use reconcile::{reconcile, Reconciliation};
pub use remote::{ReceiptStatus, RemoteValidator};
