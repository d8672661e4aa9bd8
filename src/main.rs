use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cloudbridge::api;
use cloudbridge::bridge::BridgeServer;
use cloudbridge::config::{Seed, ServerConfig};
use cloudbridge::credentials::{CredentialResolver, MemoryCredentialStore};
use cloudbridge::instances::MemoryInstanceDirectory;
use cloudbridge::session::{SessionController, SessionRegistry};
use cloudbridge::ssh::{RusshConnector, ShellCommand};

#[derive(Debug, Parser)]
#[command(name = "cloudbridge", about = "Browser-terminal SSH bridge for cloud instances")]
struct Args {
    /// WebSocket bridge listen address
    #[arg(long, env = "CLOUDBRIDGE_BRIDGE_ADDR", default_value = "127.0.0.1:8022")]
    bridge_addr: String,

    /// Status API listen address
    #[arg(long, env = "CLOUDBRIDGE_STATUS_ADDR", default_value = "127.0.0.1:8090")]
    status_addr: String,

    /// SSH handshake timeout in seconds
    #[arg(long, default_value_t = 30)]
    handshake_timeout: u64,

    /// Maximum concurrent sessions
    #[arg(long, default_value_t = 32)]
    max_sessions: usize,

    /// JSON file seeding the in-memory credential store and instance
    /// directory
    #[arg(long)]
    seed: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig {
        bridge_addr: args.bridge_addr,
        status_addr: args.status_addr,
        handshake_timeout_secs: args.handshake_timeout,
        max_sessions: args.max_sessions,
    };

    let seed = match &args.seed {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Seed::from_json(&text)?
        }
        None => {
            warn!("no seed file given; starting with empty credential and instance stores");
            Seed::default()
        }
    };
    info!(
        "loaded {} credentials and {} instances",
        seed.credentials.len(),
        seed.instances.len()
    );

    let registry = Arc::new(SessionRegistry::with_max_sessions(config.max_sessions));
    let controller = Arc::new(SessionController::new(
        registry.clone(),
        CredentialResolver::new(Arc::new(MemoryCredentialStore::with_records(
            seed.credentials,
        ))),
        Arc::new(MemoryInstanceDirectory::with_instances(seed.instances)),
        Arc::new(RusshConnector::new(Duration::from_secs(
            config.handshake_timeout_secs,
        ))),
    ));

    let server = Arc::new(BridgeServer::new(controller));
    server.bind(&config.bridge_addr).await?;

    let status_registry = registry.clone();
    let status_addr = config.status_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = api::serve(&status_addr, status_registry).await {
            warn!("status API stopped: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down, closing {} sessions", registry.count());
    for mut entry in registry.drain_all() {
        if let Some(tx) = entry.release_handle() {
            let _ = tx.send(ShellCommand::Close).await;
        }
    }

    Ok(())
}
