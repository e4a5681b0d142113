use std::sync::Arc;

use market_curator::api::run_server;
use market_curator::config::CuratorConfig;
use market_curator::data::store::{DataStore, MemoryStore};
use market_curator::Curator;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    // Setup Logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Market Curator...");

    // Load Configuration
    let config = CuratorConfig::load()?;
    info!(
        "Loaded Configuration: {} sources, {} watched, worker every {}s",
        config.sources.len(),
        config.watchlist.len(),
        config.worker.interval_secs
    );

    let store: Arc<dyn DataStore> = Arc::new(MemoryStore::new());
    info!("🗄️ [STORE] Using {} backend", store.name());

    let bind = config.server.bind.clone();
    let autostart = config.worker.autostart;
    let curator = Arc::new(Curator::from_config(config, store)?);

    if autostart {
        if curator.engine().sources().is_empty() {
            warn!("⚠️ [WORKER] autostart set but no sources configured");
        }
        curator.start_worker();
    }

    // Start API Server
    let listener = tokio::net::TcpListener::bind(bind.as_str()).await?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("⚠️ Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
    };
    run_server(curator.clone(), listener, shutdown).await?;

    curator.dispose().await;
    Ok(())
}
