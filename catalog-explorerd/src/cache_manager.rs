use std::sync::Arc;
use std::thread;
use std::time::Duration;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use crate::cache::db::CacheDb;
use crate::cache::{CacheStore, Clock, SystemClock};
use crate::config::CacheConfig;

/// Commands sent to the cache thread
pub enum CacheCommand {
    Get(String, oneshot::Sender<Result<Option<Value>>>),
    Set {
        key: String,
        value: Value,
        ttl: Duration,
        reply: oneshot::Sender<Result<()>>,
    },
    Delete(String, oneshot::Sender<Result<()>>),
    Clear(oneshot::Sender<Result<()>>),
    Keys(oneshot::Sender<Result<Vec<String>>>),
    Purge(oneshot::Sender<Result<u64>>),
    Shutdown,
}

/// Handle to the SQLite cache thread. All database access is serialized through it.
#[derive(Clone)]
pub struct CacheHandle {
    tx: mpsc::Sender<CacheCommand>,
}

impl CacheHandle {
    /// Spawn a new cache thread with the given database
    pub fn spawn(db: CacheDb) -> Self {
        Self::spawn_with_clock(db, Arc::new(SystemClock))
    }

    pub fn spawn_with_clock(db: CacheDb, clock: Arc<dyn Clock>) -> Self {
        let (tx, mut rx) = mpsc::channel::<CacheCommand>(256);

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    CacheCommand::Get(key, reply) => {
                        let result = db
                            .get_entry(&key, clock.now())
                            .map(|entry| entry.map(|e| e.value));
                        let _ = reply.send(result);
                    }
                    CacheCommand::Set { key, value, ttl, reply } => {
                        let result = db.put(&key, &value, clock.now(), ttl);
                        let _ = reply.send(result);
                    }
                    CacheCommand::Delete(key, reply) => {
                        let _ = reply.send(db.delete(&key));
                    }
                    CacheCommand::Clear(reply) => {
                        let _ = reply.send(db.clear());
                    }
                    CacheCommand::Keys(reply) => {
                        let _ = reply.send(db.keys(clock.now()));
                    }
                    CacheCommand::Purge(reply) => {
                        let _ = reply.send(db.purge_expired(clock.now()));
                    }
                    CacheCommand::Shutdown => {
                        tracing::info!("Cache thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> CacheCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| anyhow!("Cache thread is not running"))?;
        rx.await?
    }

    /// Delete expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        self.request(CacheCommand::Purge).await
    }

    /// Shutdown the cache thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(CacheCommand::Shutdown)
            .await
            .map_err(|_| anyhow!("Cache thread is not running"))?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for CacheHandle {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let key = key.to_string();
        self.request(|reply| CacheCommand::Get(key, reply)).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let key = key.to_string();
        self.request(|reply| CacheCommand::Set { key, value, ttl, reply }).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.request(|reply| CacheCommand::Delete(key, reply)).await
    }

    async fn clear(&self) -> Result<()> {
        self.request(CacheCommand::Clear).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.request(CacheCommand::Keys).await
    }
}

/// Periodic maintenance loop purging expired entries until cancelled
pub async fn run(
    cache: CacheHandle,
    config: CacheConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let mut maintenance_interval = tokio::time::interval(
        Duration::from_secs(config.maintenance_interval_secs.max(1))
    );

    loop {
        tokio::select! {
            _ = maintenance_interval.tick() => {
                match cache.purge_expired().await {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!("Purged {} expired cache entries", n),
                    Err(e) => tracing::error!("Failed to run cache maintenance: {}", e),
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Cache maintenance shutting down");
                break;
            }
        }
    }

    Ok(())
}
