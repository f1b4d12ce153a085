pub mod db;
pub mod keys;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A cached payload with the time it was recorded and how long it stays valid.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub value: T,
    pub recorded_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, recorded_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self { value, recorded_at, ttl }
    }

    /// An entry is absent once strictly more than `ttl` has elapsed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age_ms = (now - self.recorded_at).num_milliseconds();
        age_ms > self.ttl.as_millis() as i64
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Key/value store with time-based expiry.
///
/// `get` must evict and report absent for an expired entry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn clear(&self) -> Result<()>;
    /// Keys of all live entries
    async fn keys(&self) -> Result<Vec<String>>;
}

/// Typed front for a `CacheStore`.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Entries that no longer decode as `T` are dropped and reported absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(value) = self.store.get(key).await? else {
            return Ok(None);
        };

        match serde_json::from_value(value) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(e) => {
                tracing::warn!("Dropping undecodable cache entry {}: {}", key, e);
                self.store.delete(key).await?;
                Ok(None)
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.store.set(key, value, ttl).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(key).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }

    pub async fn keys(&self) -> Result<Vec<String>> {
        self.store.keys().await
    }

    /// Delete every entry derived from `base_url`. Returns the number removed.
    pub async fn clear_for(&self, base_url: &str) -> Result<usize> {
        let mut removed = 0;
        for key in self.store.keys().await? {
            if keys::belongs_to(&key, base_url) {
                self.store.delete(&key).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
