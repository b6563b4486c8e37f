//! Agora Chat Server
//!
//! Serves the chat room over WebSocket until Ctrl-C.

use std::sync::Arc;
use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use agora::{
    ChatHub, ChatServer, ServerConfig, VERSION,
    directory::{InMemoryBanDirectory, InMemoryMessageStore, JwtIdentityProvider},
    network::AuthConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Agora Chat Server v{}", VERSION);

    let auth = AuthConfig::from_env();
    if !auth.is_configured() {
        warn!("No AUTH_SECRET or AUTH_PUBLIC_KEY_PEM set, every join will be rejected");
    }
    let config = ServerConfig::from_env().context("invalid server configuration")?;
    info!(
        bind = %config.bind_addr,
        max_connections = config.max_connections,
        sweep_interval = ?config.hub.watchdog.sweep_interval,
        "Configuration loaded"
    );

    let hub = Arc::new(ChatHub::new(
        Arc::new(JwtIdentityProvider::new(auth)),
        Arc::new(InMemoryBanDirectory::new()),
        Arc::new(InMemoryMessageStore::default()),
        config.hub.clone(),
    ));
    let server = Arc::new(ChatServer::new(config, hub));

    let signal_server = server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
            signal_server.shutdown();
        }
    });

    server.run().await?;
    info!("Server stopped");
    Ok(())
}
