//! codedrop-relay binary entry point.
//!
//! Usage:
//! ```bash
//! codedrop-relay --config relay.toml
//! codedrop-relay --bind 127.0.0.1:9000
//! codedrop-relay --help
//! ```

use anyhow::Context;
use clap::Parser;
use codedrop_relay::config::Config;
use codedrop_relay::http::{build_router, health};
use codedrop_relay::protocol::WsRelay;
use codedrop_relay::reaper::spawn_reaper_task;
use codedrop_relay::transport::ChannelTransport;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Code-based rendezvous relay.
#[derive(Parser, Debug)]
#[command(name = "codedrop-relay", version, about)]
struct Cli {
    /// Path to a TOML config file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `server.bind_address`
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }

    let bind_address = config.server.bind_address.clone();
    let cleanup = config.cleanup.clone();

    health::init_start_time();
    let transport = ChannelTransport::with_queue_size(config.limits.outbound_queue_size);
    let relay = Arc::new(WsRelay::new(config, Arc::new(transport)));
    let reaper = spawn_reaper_task(Arc::clone(&relay), cleanup);

    let app = build_router(Arc::clone(&relay));
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;

    tracing::info!(
        "codedrop-relay v{} listening on {} (ws path {})",
        env!("CARGO_PKG_VERSION"),
        listener.local_addr()?,
        relay.config().server.ws_path
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    reaper.abort();
    tracing::info!("codedrop-relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
