//! Command implementations for the `iapkit` binary.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use iapkit_manager::{EntitlementManager, FilePlatform, ManagerConfig};
use iapkit_receipt::{
    AppIdentity, DeviceIdentifier, Environment, ProductSet, ReceiptFields, ReceiptVerifier,
    SignedContainer, TrustAnchor, TrustPolicy,
};
use iapkit_store::SqliteStore;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "iapkit")]
#[command(about = "Offline App Store receipt verification")]
pub struct Cli {
    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Verify a receipt for this app and device, printing the purchased products
    Verify(VerifyArgs),
    /// Authenticate a receipt and print its decoded fields
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Receipt file
    #[arg(long)]
    pub receipt: Option<PathBuf>,

    /// Trusted root certificate (DER or PEM)
    #[arg(long)]
    pub root_cert: Option<PathBuf>,

    /// Expected bundle identifier
    #[arg(long)]
    pub bundle_id: Option<String>,

    /// Expected bundle version
    #[arg(long)]
    pub bundle_version: Option<String>,

    /// Device identifier (UUID)
    #[arg(long)]
    pub device_id: DeviceIdentifier,

    /// Receipt environment: debug, testflight or appstore [default: config, else appstore]
    #[arg(long)]
    pub environment: Option<Environment>,

    /// TOML configuration supplying defaults for the options above
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// SQLite entitlement database to reconcile with the receipt
    #[arg(long)]
    pub store: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Receipt file
    #[arg(long)]
    pub receipt: PathBuf,

    /// Trusted root certificate (DER or PEM)
    #[arg(long)]
    pub root_cert: PathBuf,

    /// Receipt environment: debug, testflight or appstore [default: appstore]
    #[arg(long)]
    pub environment: Option<Environment>,
}

/// Output of `iapkit verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub environment: Environment,
    pub products: ProductSet,
    /// Whether the entitlement store changed; absent without `--store`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_updated: Option<bool>,
}

/// Flag, then config, then [`Environment::AppStore`]. Chain checks are only
/// skipped when debug is asked for explicitly.
fn environment_for(flag: Option<Environment>, config: Option<&ManagerConfig>) -> Environment {
    flag.or_else(|| config.and_then(|c| c.environment))
        .unwrap_or(Environment::AppStore)
}

fn required<T>(value: Option<T>, flag: &str) -> Result<T> {
    match value {
        Some(value) => Ok(value),
        None => bail!("--{flag} is required (or set it in --config)"),
    }
}

fn read_receipt(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read receipt {}", path.display()))
}

fn load_policy(root_cert: &Path, environment: Environment, chain: Option<bool>) -> Result<TrustPolicy> {
    let root = TrustAnchor::load(root_cert)
        .with_context(|| format!("failed to load root certificate {}", root_cert.display()))?;
    Ok(TrustPolicy::new(
        root,
        chain.unwrap_or_else(|| environment.requires_chain_verification()),
    ))
}

/// Runs `iapkit verify`.
///
/// # Errors
///
/// Fails if an input cannot be read or the receipt does not verify.
pub fn verify(args: VerifyArgs) -> Result<VerifyReport> {
    let config = args
        .config
        .as_deref()
        .map(ManagerConfig::load)
        .transpose()
        .context("failed to load configuration")?;
    let app = config.as_ref().map(|c| c.app.clone()).unwrap_or_default();

    let environment = environment_for(args.environment, config.as_ref());
    let receipt = required(args.receipt.or(app.receipt_path), "receipt")?;
    let root_cert = required(
        args.root_cert
            .or_else(|| config.as_ref().map(|c| c.trust.root_certificate.clone())),
        "root-cert",
    )?;
    let identity = AppIdentity::new(
        required(args.bundle_id.or(app.bundle_id), "bundle-id")?,
        required(args.bundle_version.or(app.bundle_version), "bundle-version")?,
        args.device_id,
    );
    let chain = config
        .as_ref()
        .and_then(|c| c.trust.chain_verification_required);
    let policy = load_policy(&root_cert, environment, chain)?;
    info!(%environment, receipt = %receipt.display(), "Verifying receipt");

    match args.store {
        None => {
            let verifier = ReceiptVerifier::new(policy, identity);
            let validated = verifier
                .verify(&read_receipt(&receipt)?)
                .context("receipt verification failed")?;
            Ok(VerifyReport {
                environment,
                products: validated.into_product_ids(),
                store_updated: None,
            })
        }
        Some(store_path) => {
            let store = SqliteStore::new(&store_path).with_context(|| {
                format!("failed to open entitlement store {}", store_path.display())
            })?;
            let persisted = store.all_purchased()?;
            let manager = EntitlementManager::new(
                FilePlatform::new(receipt, identity),
                store,
                environment,
                policy,
            );
            manager.load_persisted(&persisted)?;
            let outcome = manager
                .process_receipt()
                .context("receipt verification failed")?;
            Ok(VerifyReport {
                environment,
                products: manager.purchased_product_ids()?,
                store_updated: Some(!outcome.is_unchanged()),
            })
        }
    }
}

/// Runs `iapkit inspect`.
///
/// # Errors
///
/// Fails if an input cannot be read or the receipt signature does not verify.
pub fn inspect(args: InspectArgs) -> Result<ReceiptFields> {
    let environment = environment_for(args.environment, None);
    let policy = load_policy(&args.root_cert, environment, None)?;
    let raw = read_receipt(&args.receipt)?;
    let fields = SignedContainer::parse(&raw)
        .and_then(|container| {
            policy.verify(&container)?;
            ReceiptFields::from_payload(container.content())
        })
        .context("receipt could not be decoded")?;
    Ok(fields)
}
