use std::sync::Arc;

use clap::Parser;
use knowmesh_core::KnowMeshConfig;
use knowmesh_mesh::LocalMesh;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use knowmesh_server::{server, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "knowmesh.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match KnowMeshConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    // In-process transport only; replication does not leave this daemon.
    let transport = Arc::new(LocalMesh::new());
    let state = match AppState::build(config, transport) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open knowledge store: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        records = state.store.get_all().len(),
        key = state.store.namespace_key(),
        "Knowledge store ready"
    );

    if let Some(replicator) = &state.replicator {
        if let Err(e) = replicator.open().await {
            tracing::warn!("Mesh replication unavailable, running local-only: {}", e);
        }
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let socket_path = state.config.service.socket_path.clone();
    let result = server::run_unix_server(&socket_path, state.clone(), tx.subscribe()).await;

    if let Some(replicator) = &state.replicator {
        replicator.close().await;
    }

    result
}
