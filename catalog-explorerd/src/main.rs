use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use catalog_explorerd::api;
use catalog_explorerd::cache::db::CacheDb;
use catalog_explorerd::cache::memory::MemoryCache;
use catalog_explorerd::cache::CacheStore;
use catalog_explorerd::cache_manager::{self, CacheHandle};
use catalog_explorerd::config::{CacheBackend, Config};
use catalog_explorerd::token::MemoryTokenStore;
use catalog_explorerd::Explorer;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("catalog_explorerd=info"))
        )
        .init();

    tracing::info!("Starting catalog-explorerd");

    // A missing default config file means defaults; an explicit path must load
    let config = match std::env::args().nth(1) {
        Some(path) => {
            let config = Config::load(&path)
                .with_context(|| format!("Failed to load config from {}", path))?;
            tracing::info!("Loaded config from {}", path);
            config
        }
        None => {
            let path = "/etc/catalog-explorer/explorerd.toml";
            if std::path::Path::new(path).exists() {
                Config::load(path).with_context(|| format!("Failed to load config from {}", path))?
            } else {
                tracing::info!("No config file, using defaults");
                Config::default()
            }
        }
    };

    let cancel = CancellationToken::new();

    let (store, sqlite_cache): (Arc<dyn CacheStore>, Option<CacheHandle>) = match config.cache.backend {
        CacheBackend::Memory => {
            tracing::info!("Using in-memory result cache");
            (Arc::new(MemoryCache::new()) as Arc<dyn CacheStore>, None)
        }
        CacheBackend::Sqlite => {
            let db = CacheDb::open(&config.cache.db_path)?;
            tracing::info!("Opened cache database at {:?}", config.cache.db_path);
            let handle = CacheHandle::spawn(db);
            (Arc::new(handle.clone()) as Arc<dyn CacheStore>, Some(handle))
        }
    };

    // Expired entries are evicted on read; the maintenance task only reclaims space
    let mgr_handle = sqlite_cache.clone().map(|cache| {
        let mgr_cancel = cancel.clone();
        let mgr_config = config.cache.clone();
        tokio::spawn(async move {
            if let Err(e) = cache_manager::run(cache, mgr_config, mgr_cancel).await {
                tracing::error!("Cache maintenance error: {}", e);
            }
        })
    });

    let tokens = Arc::new(MemoryTokenStore::new(&config.tokens));
    let explorer = Arc::new(
        Explorer::new(&config, store, tokens).context("Failed to create explorer")?,
    );

    let app = api::routes::router(api::routes::AppState::new(explorer.clone()));

    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    explorer.cancel_discovery();
    cancel.cancel();

    let _ = server_handle.await;
    if let Some(handle) = mgr_handle {
        let _ = handle.await;
    }

    if let Some(cache) = sqlite_cache {
        if let Err(e) = cache.shutdown().await {
            tracing::error!("Failed to shutdown cache: {}", e);
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
