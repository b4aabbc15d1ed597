//! Thinboot Boot Server
//!
//! HTTP server that hands iPXE scripts and one-time RDP credentials to
//! network-booting thin clients.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use thinboot_core::ServerConfig;
use thinboot_core::config::resolve_master_secret;
use thinboot_core::tracing_init::init_tracing;
use thinboot_crypto::CredentialVault;
use thinboot_server::liveness::spawn_sweeper;
use thinboot_server::server::{AppState, build_router};
use thinboot_server::storage::BootDatabase;

#[derive(Parser, Debug)]
#[command(name = "thinboot-server")]
#[command(
    version,
    about = "Thinboot boot server - iPXE scripts and one-time credential handoff"
)]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "THINBOOT_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    addr: SocketAddr,

    /// Path to SQLite database file.
    #[arg(long, env = "THINBOOT_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Path to a JSON configuration file.
    #[arg(long, env = "THINBOOT_CONFIG")]
    config: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("thinboot_server=info,tower_http=warn", args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        "Starting thinboot-server"
    );

    let config = ServerConfig::load(args.config.as_deref())?;

    let secret_env = std::env::var("THINBOOT_SECRET_KEY").ok();
    let master_secret = resolve_master_secret(secret_env.as_deref(), &config.secret_key_file)?;
    let vault = Arc::new(CredentialVault::derive(master_secret.as_bytes())?);

    let db = match &args.db_path {
        Some(path) => {
            info!(path = %path.display(), "Opening boot database");
            BootDatabase::open(path).await?
        }
        None => {
            let default_path = default_db_path()?;
            info!(path = %default_path.display(), "Opening boot database (default path)");
            BootDatabase::open(&default_path).await?
        }
    };

    let state = AppState::from_config(db, vault, &config);

    match state.registry.reencrypt_legacy_secrets().await {
        Ok(0) => {}
        Ok(migrated) => info!(migrated, "Re-encrypted legacy RDP secrets"),
        Err(e) => warn!(error = %e, "Legacy secret migration failed"),
    }

    let sweeper = spawn_sweeper(
        state.liveness.clone(),
        vec![
            Arc::clone(&state.boot_limiter),
            Arc::clone(&state.ingest_limiter),
        ],
        Duration::from_secs(config.sweep_interval_secs),
        Duration::from_secs(config.sweep_timeout_secs),
    );

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    info!(
        addr = %args.addr,
        server_ip = %config.server_ip,
        initrd_dir = %config.initrd_dir.display(),
        "Boot server listening"
    );

    tokio::select! {
        result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        ) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    sweeper.abort();
    info!("Boot server stopped");
    Ok(())
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".thinboot").join("thinboot.db"))
}
