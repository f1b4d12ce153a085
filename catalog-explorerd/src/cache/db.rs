use std::path::Path;
use std::time::Duration;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params, OptionalExtension};
use serde_json::Value;
use super::CacheEntry;

/// SQLite-backed cache table. Owned by a single thread, see `cache_manager`.
pub struct CacheDb {
    conn: Connection,
}

impl CacheDb {
    /// Open or create the SQLite database with WAL mode enabled
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL mode")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key          TEXT PRIMARY KEY,
                value        TEXT NOT NULL,
                recorded_at  TEXT NOT NULL,
                ttl_ms       INTEGER NOT NULL,
                expires_at   INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_expires_at ON cache_entries(expires_at);
            "#,
        )
        .context("Failed to create database schema")?;

        Ok(Self { conn })
    }

    /// Fetch a live entry. An expired entry is deleted and reported absent.
    pub fn get_entry(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry<Value>>> {
        let entry = self
            .conn
            .query_row(
                "SELECT value, recorded_at, ttl_ms FROM cache_entries WHERE key = ?1",
                params![key],
                Self::row_to_entry,
            )
            .optional()
            .context("Failed to query cache entry")?;

        match entry {
            Some(entry) if entry.is_expired(now) => {
                self.delete(key)?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Insert or replace an entry
    pub fn put(&self, key: &str, value: &Value, recorded_at: DateTime<Utc>, ttl: Duration) -> Result<()> {
        let value_json = serde_json::to_string(value)
            .context("Failed to serialize cache value")?;
        let ttl_ms = ttl.as_millis() as i64;
        let expires_at = recorded_at.timestamp_millis().saturating_add(ttl_ms);

        self.conn.execute(
            r#"
            INSERT INTO cache_entries (key, value, recorded_at, ttl_ms, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                recorded_at = excluded.recorded_at,
                ttl_ms = excluded.ttl_ms,
                expires_at = excluded.expires_at
            "#,
            params![key, value_json, recorded_at.to_rfc3339(), ttl_ms, expires_at],
        )
        .context("Failed to write cache entry")?;

        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
            .context("Failed to delete cache entry")?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM cache_entries", [])
            .context("Failed to clear cache")?;
        Ok(())
    }

    /// Keys of live entries, after purging expired ones
    pub fn keys(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        self.purge_expired(now)?;

        let mut stmt = self
            .conn
            .prepare("SELECT key FROM cache_entries ORDER BY key")
            .context("Failed to prepare query")?;

        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("Failed to query cache keys")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to collect cache keys")?;

        Ok(keys)
    }

    /// Delete every expired entry
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let count = self
            .conn
            .execute(
                "DELETE FROM cache_entries WHERE expires_at < ?1",
                params![now.timestamp_millis()],
            )
            .context("Failed to purge expired entries")?;

        Ok(count as u64)
    }

    fn row_to_entry(row: &rusqlite::Row) -> Result<CacheEntry<Value>, rusqlite::Error> {
        let value_json: String = row.get(0)?;
        let recorded_at_str: String = row.get(1)?;
        let ttl_ms: i64 = row.get(2)?;

        let value = serde_json::from_str(&value_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            ))?;

        let recorded_at = DateTime::parse_from_rfc3339(&recorded_at_str)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                Box::new(e),
            ))?
            .with_timezone(&Utc);

        Ok(CacheEntry {
            value,
            recorded_at,
            ttl: Duration::from_millis(ttl_ms.max(0) as u64),
        })
    }
}
