//! `iapkit`: verify App Store receipts from the command line.
//!
//! Usage:
//!   iapkit verify --receipt receipt --root-cert AppleIncRootCertificate.cer \
//!     --bundle-id com.example.app --bundle-version 1.0 --device-id <uuid>
//!   iapkit inspect --receipt receipt --root-cert StoreKitTestCertificate.cer \
//!     --environment debug

use anyhow::Result;
use clap::Parser;
use iapkit_cli::{inspect, verify, Cli, Command};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let output = match cli.command {
        Command::Verify(args) => serde_json::to_string_pretty(&verify(args)?)?,
        Command::Inspect(args) => serde_json::to_string_pretty(&inspect(args)?)?,
    };
    println!("{output}");
    Ok(())
}
