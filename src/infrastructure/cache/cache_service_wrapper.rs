//! Cache service wrapper to handle different cache implementations

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

use crate::{
    application::{ApplicationError, CacheService},
    infrastructure::cache::{
        file_cache::{self, FileTransientStore},
        memory_cache::{MemoryCacheStats, MemoryObjectCache},
    },
};

/// Wrapper enum for the cache tiers
pub enum CacheServiceWrapper {
    File(Arc<FileTransientStore>),
    Memory(Arc<MemoryObjectCache>),
}

impl CacheServiceWrapper {
    pub fn file(cache: Arc<FileTransientStore>) -> Self {
        Self::File(cache)
    }

    pub fn memory(cache: Arc<MemoryObjectCache>) -> Self {
        Self::Memory(cache)
    }

    /// Get cache statistics
    pub async fn get_stats(&self) -> CacheStats {
        match self {
            Self::File(cache) => CacheStats::File(cache.get_stats().await),
            Self::Memory(cache) => CacheStats::Memory(cache.get_stats().await),
        }
    }

    /// Clear all cache entries
    pub async fn clear_all(&self) -> Result<(), ApplicationError> {
        match self {
            Self::File(cache) => cache.clear_all().await,
            Self::Memory(cache) => {
                cache.flush().await;
                Ok(())
            }
        }
    }

    /// Get cache size
    pub async fn size(&self) -> Result<usize, ApplicationError> {
        match self {
            Self::File(cache) => cache.size().await,
            Self::Memory(cache) => Ok(cache.size().await),
        }
    }

    /// Read `key` from `namespace`
    pub async fn get_cached<T>(&self, key: &str, namespace: &str) -> Result<Option<T>, ApplicationError>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        self.get(&MemoryObjectCache::namespaced(key, namespace)).await
    }

    /// Store `value` under `key` in `namespace`
    pub async fn set_cached<T>(
        &self,
        key: &str,
        value: &T,
        namespace: &str,
        ttl: Duration,
    ) -> Result<(), ApplicationError>
    where
        T: Serialize + Send + Sync,
    {
        self.set(&MemoryObjectCache::namespaced(key, namespace), value, ttl)
            .await
    }
}

#[async_trait]
impl CacheService for CacheServiceWrapper {
    async fn get<T>(&self, key: &str) -> Result<Option<T>, ApplicationError>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        match self {
            Self::File(cache) => cache.get(key).await,
            Self::Memory(cache) => cache.get(key).await,
        }
    }

    async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), ApplicationError>
    where
        T: Serialize + Send + Sync,
    {
        match self {
            Self::File(cache) => cache.set(key, value, ttl).await,
            Self::Memory(cache) => cache.set(key, value, ttl).await,
        }
    }

    async fn invalidate(&self, key: &str) -> Result<(), ApplicationError> {
        match self {
            Self::File(cache) => cache.invalidate(key).await,
            Self::Memory(cache) => cache.invalidate(key).await,
        }
    }
}

/// Combined cache statistics
#[derive(Debug, Clone)]
pub enum CacheStats {
    File(file_cache::CacheStats),
    Memory(MemoryCacheStats),
}

impl CacheStats {
    pub fn total_hits(&self) -> u64 {
        match self {
            Self::File(stats) => stats.hits,
            Self::Memory(stats) => stats.hits,
        }
    }

    pub fn total_misses(&self) -> u64 {
        match self {
            Self::File(stats) => stats.misses,
            Self::Memory(stats) => stats.misses,
        }
    }

    /// Get cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let hits = self.total_hits();
        let total = hits + self.total_misses();

        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }

    pub fn cache_type(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Memory(_) => "memory",
        }
    }
}

/// Serializable summary used by the health endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSummary {
    pub cache_type: String,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entries: usize,
}

impl CacheServiceWrapper {
    pub async fn summary(&self) -> Result<CacheSummary, ApplicationError> {
        let stats = self.get_stats().await;
        Ok(CacheSummary {
            cache_type: stats.cache_type().to_string(),
            hits: stats.total_hits(),
            misses: stats.total_misses(),
            hit_rate: stats.hit_rate(),
            entries: self.size().await?,
        })
    }
}
