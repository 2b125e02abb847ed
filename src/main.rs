use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tracing::{error, info, Level};

use peer_royale::config::DirectoryConfig;
use peer_royale::lobby::server;
use peer_royale::lobby::store::LobbyStore;
use peer_royale::metrics::{self, Metrics};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Peer Royale lobby directory v{}", env!("CARGO_PKG_VERSION"));

    let config = DirectoryConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: {}:{}, lobby_ttl={}s",
        config.bind_address, config.port, config.lobby_ttl_secs
    );

    let metrics = Arc::new(Metrics::new());

    let metrics_clone = metrics.clone();
    let metrics_bind = config.bind_address;
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_bind, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let store = Arc::new(Mutex::new(LobbyStore::new(config.lobby_ttl_secs)));
    let listener = TcpListener::bind(SocketAddr::new(config.bind_address, config.port)).await?;

    // Shutdown signal handler
    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = server::serve(listener, store.clone(), metrics.clone()) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    info!("Directory stopped with {} lobbies listed", store.lock().len());
    Ok(())
}
