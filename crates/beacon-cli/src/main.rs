//! Beacon CLI - Command-line interface for the discovery platform

use anyhow::Context;
use async_trait::async_trait;
use beacon_core::{
    Beacon, BeaconConfig, IdentityResolver, ResolveError, ResolvedIdentity, ServiceRef,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "beacon")]
#[command(about = "Beacon - Discovery registry for JVM fleets")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Start the discovery platform
    Serve {
        /// Configuration file path
        #[arg(short, long, default_value = "config/beacon.json")]
        config: PathBuf,
    },
    /// Check configuration validity
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "config/beacon.json")]
        config: PathBuf,
    },
    /// Print the merged discovery tree as JSON
    Tree {
        /// Configuration file path
        #[arg(short, long, default_value = "config/beacon.json")]
        config: PathBuf,
    },
}

/// Fallback resolver that adopts the connect URI as the identity.
///
/// Deployments with attach-based identity resolution wire their own
/// [`IdentityResolver`] through the library API; the standalone binary has
/// no JVM attach machinery.
struct UriIdentityResolver;

#[async_trait]
impl IdentityResolver for UriIdentityResolver {
    async fn resolve(
        &self,
        target: &ServiceRef,
        _allow_stored_credentials: bool,
    ) -> Result<ResolvedIdentity, ResolveError> {
        Ok(ResolvedIdentity::new(target.connect_uri.clone()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    match cli.command {
        Some(Commands::Serve { config }) => {
            let config = BeaconConfig::load(&config)?;
            let mut beacon = Beacon::new(config, Arc::new(UriIdentityResolver))?;

            let mut events = beacon
                .take_events()
                .context("event stream already taken")?;
            tokio::spawn(async move {
                while let Some((category, event)) = events.recv().await {
                    info!(category, kind = ?event.kind, uri = %event.service_ref.connect_uri, "discovery event");
                }
            });

            beacon.start().await?;
            info!("Beacon running, press Ctrl-C to stop");

            tokio::signal::ctrl_c().await?;
            beacon.shutdown().await;
        }
        Some(Commands::Check { config }) => {
            let parsed = BeaconConfig::load(&config)?;
            println!("Config OK: {}", serde_json::to_string_pretty(&parsed)?);
        }
        Some(Commands::Tree { config }) => {
            let config = BeaconConfig::load(&config)?;
            let beacon = Beacon::new(config, Arc::new(UriIdentityResolver))?;
            let tree = beacon.discovery_tree()?;
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }
        None => {
            println!("Beacon v0.1.0 - Use --help for commands");
        }
    }

    Ok(())
}
