//! Docserver Daemon
//!
//! Serves documentation bundles out of a local store directory.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults (store in the platform data dir, port 8080)
//! docserver
//!
//! # Start with custom config
//! docserver --config /etc/docserver.toml
//!
//! # Override the store and port
//! docserver --store-dir /srv/docs --http-port 8091
//! ```
//!
//! The store directory must already exist; the server refuses to start
//! otherwise.

use clap::Parser;
use docserver::{BundleStore, Config, HttpServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "docserver")]
#[command(about = "Documentation bundle server")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bundle store directory (must exist)
    #[arg(long, env = "DOCSERVER_STORE")]
    store_dir: Option<PathBuf>,

    /// Interface to bind
    #[arg(long, env = "DOCSERVER_HOST")]
    http_host: Option<String>,

    /// HTTP port
    #[arg(long, env = "DOCSERVER_PORT")]
    http_port: Option<u16>,

    /// Largest accepted upload in bytes
    #[arg(long)]
    max_upload_bytes: Option<usize>,

    /// Largest total decompressed size of an upload in bytes
    #[arg(long)]
    max_unpacked_bytes: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("docserver=info".parse()?))
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.store_dir {
        config.store_dir = dir;
    }
    if let Some(host) = args.http_host {
        config.http_host = host;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(limit) = args.max_upload_bytes {
        config.max_upload_bytes = limit;
    }
    if let Some(limit) = args.max_unpacked_bytes {
        config.max_unpacked_bytes = limit;
    }

    info!(
        store_dir = %config.store_dir.display(),
        http_port = config.http_port,
        "Starting docserver"
    );

    // Missing store root is fatal: never start serving without it
    let store = Arc::new(
        BundleStore::open(&config.store_dir)
            .await?
            .with_max_unpacked_bytes(config.max_unpacked_bytes),
    );

    let http_addr = config.bind_addr()?;
    let http_server = Arc::new(
        HttpServer::new(store, http_addr).with_max_upload_bytes(config.max_upload_bytes),
    );

    info!("HTTP API available at http://{}", http_addr);
    info!("Endpoints:");
    info!("  GET  /              - List bundles");
    info!("  POST /              - Upload bundle (?name=...)");
    info!("  GET  /{{id}}.zip      - Download bundle archive");
    info!("  GET  /{{id}}/{{path}}   - Serve file from bundle");
    info!("  GET  /health        - Health check");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
                return Err(e.into());
            }
        }
        _ = shutdown => {}
    }

    Ok(())
}
