//! In-memory object cache with namespaced keys

use crate::application::{ApplicationError, CacheService};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Statistics for the in-memory cache
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub flushes: u64,
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// Process-local object cache.
///
/// Values are stored as JSON so the cache behaves like a remote object cache:
/// callers always get an owned copy back.
#[derive(Default)]
pub struct MemoryObjectCache {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    stats: Mutex<MemoryCacheStats>,
}

impl MemoryObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full key of `key` within `namespace`
    pub fn namespaced(key: &str, namespace: &str) -> String {
        format!("{}:{}", namespace, key)
    }

    pub async fn get_stats(&self) -> MemoryCacheStats {
        self.stats.lock().await.clone()
    }

    pub async fn size(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Drop every entry in every namespace
    pub async fn flush(&self) {
        let mut entries = self.entries.write().await;
        let dropped = entries.len();
        entries.clear();
        drop(entries);

        self.stats.lock().await.flushes += 1;
        debug!("Flushed object cache ({} entries)", dropped);
    }
}

#[async_trait]
impl CacheService for MemoryObjectCache {
    async fn get<T>(&self, key: &str) -> Result<Option<T>, ApplicationError>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        let entry = self.entries.read().await.get(key).cloned();

        match entry {
            Some(entry) if entry.expires_at > Instant::now() => {
                let value = serde_json::from_value(entry.value)?;
                self.stats.lock().await.hits += 1;
                Ok(Some(value))
            }
            Some(_) => {
                self.entries.write().await.remove(key);
                let mut stats = self.stats.lock().await;
                stats.misses += 1;
                stats.evictions += 1;
                Ok(None)
            }
            None => {
                self.stats.lock().await.misses += 1;
                Ok(None)
            }
        }
    }

    async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), ApplicationError>
    where
        T: serde::Serialize + Send + Sync,
    {
        let entry = MemoryEntry {
            value: serde_json::to_value(value)?,
            expires_at: Instant::now() + ttl,
        };
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, existing| existing.expires_at > now);
        let swept = before - entries.len();
        entries.insert(key.to_string(), entry);
        drop(entries);

        if swept > 0 {
            self.stats.lock().await.evictions += swept as u64;
            debug!("Swept {} expired object cache entries", swept);
        }
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), ApplicationError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
