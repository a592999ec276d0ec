//! Compute mesh node binary: a decentralized task auction, execution, and
//! settlement peer (§1, §9).

use anyhow::{Context, Result};
use clap::Parser;
use mesh_crypto::load_or_generate_signing_key;
use mesh_node::{MeshConfig, MeshNode};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mesh-node")]
#[command(about = "Compute mesh node: auction, execution, and token settlement")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "./node.toml", env = "MESH_CONFIG")]
    config: PathBuf,

    /// Node id (overrides config)
    #[arg(long, env = "MESH_NODE_ID")]
    node_id: Option<String>,

    /// Override the gossip listen port
    #[arg(long, env = "MESH_PUB_PORT")]
    pub_port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Parser)]
enum Command {
    /// Check wallet/reputation/configuration health without joining the mesh
    Health,

    /// Show node version
    Version,

    /// Generate (or reuse) this node's signing and encryption keypairs
    Keygen {
        #[arg(short, long, default_value = "./keys")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},mesh_node=debug", log_level).into()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    if let Some(cmd) = cli.command {
        match cmd {
            Command::Health => {
                let config = MeshConfig::load(&cli.config).context("loading configuration")?;
                config.validate().context("validating configuration")?;
                println!("configuration ok: node={}", config.node.id);
                return Ok(());
            }
            Command::Version => {
                println!("mesh-node v{}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            Command::Keygen { output } => {
                generate_keypair(output)?;
                return Ok(());
            }
        }
    }

    info!("starting mesh-node v{}", env!("CARGO_PKG_VERSION"));

    let mut config = MeshConfig::load(&cli.config).context("loading configuration")?;
    info!(path = ?cli.config, "loaded configuration");

    if let Some(node_id) = cli.node_id {
        config.node.id = node_id;
    }
    if let Some(pub_port) = cli.pub_port {
        config.network.pub_port = pub_port;
    }

    config.validate().context("validating configuration")?;

    let node = MeshNode::new(config).await.context("initializing node")?;
    info!("node initialized");

    tokio::select! {
        result = node.run() => {
            if let Err(e) = result {
                error!("node error: {}", e);
                return Err(e.into());
            }
        }
        _ = signal::ctrl_c() => {
            info!("received shutdown signal (ctrl+c)");
            node.shutdown().await?;
        }
        _ = shutdown_signal() => {
            info!("received shutdown signal (sigterm)");
            node.shutdown().await?;
        }
    }

    info!("node stopped gracefully");
    Ok(())
}

fn generate_keypair(output_dir: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&output_dir)?;
    let signing_path = output_dir.join("signing_key.json");
    let identity = load_or_generate_signing_key(&signing_path)?;
    info!(path = ?signing_path, public_key = identity.public_key_hex(), "signing keypair ready");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    sigterm.recv().await;
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    std::future::pending::<()>().await
}
