use anyhow::{Context, Result};
use clap::Parser;
use pulsegate_server::{
    Cli, CommandDispatcher, CommandServer, ServerConfig, SessionStore, ToolExecutor,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::try_from(Cli::parse())?;
    info!("PulseBlaster server starting");
    info!("  listen: {}", config.listen_addr);
    info!("  state dir: {}", config.state_dir.display());
    info!("  tool: {}", config.tool.display());

    tokio::fs::create_dir_all(&config.state_dir)
        .await
        .with_context(|| format!("failed to create {}", config.state_dir.display()))?;

    let store = Arc::new(SessionStore::open(&config.state_dir).await);
    let executor = Arc::new(ToolExecutor::new(&config.tool, config.scratch_file()));
    let dispatcher = Arc::new(CommandDispatcher::new(store, executor));

    let server = CommandServer::bind(config.listen_addr, dispatcher, config.read_timeout).await?;
    server.run(shutdown_signal()).await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Stopping service ..."),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
