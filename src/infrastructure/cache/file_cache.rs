//! File-backed transient storage

use crate::application::{ApplicationError, CacheService};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::sync::Mutex;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Transient entry with its expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TransientEntry<T> {
    data: T,
    created_at: u64,
    expires_at: u64,
}

impl<T> TransientEntry<T> {
    fn is_expired(&self) -> bool {
        FileTransientStore::current_timestamp() >= self.expires_at
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired_entries: u64,
    pub total_entries: u64,
    pub cleanup_runs: u64,
}

/// Transients stored as one JSON file per key, surviving restarts.
///
/// Writes go through a temporary file and a rename, serialized per key.
pub struct FileTransientStore {
    cache_dir: PathBuf,
    file_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    stats: Mutex<CacheStats>,
}

impl FileTransientStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            file_locks: Mutex::new(HashMap::new()),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.cache_dir
    }

    /// SHA-256 of the key, so any key maps to a safe file name
    fn file_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn entry_path(&self, file_key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", file_key))
    }

    fn temp_path(&self, file_key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.tmp", file_key))
    }

    fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    async fn lock_for(&self, file_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.file_locks.lock().await;
        locks
            .entry(file_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn ensure_cache_dir(&self) -> Result<(), ApplicationError> {
        if !self.cache_dir.exists() {
            fs::create_dir_all(&self.cache_dir).await.map_err(|e| {
                error!("Failed to create cache directory: {}", e);
                ApplicationError::Io(e)
            })?;
            debug!("Created cache directory: {:?}", self.cache_dir);
        }
        Ok(())
    }

    async fn remove_if_present(path: &Path) -> Result<bool, ApplicationError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ApplicationError::Io(e)),
        }
    }

    pub async fn get_stats(&self) -> CacheStats {
        self.stats.lock().await.clone()
    }

    /// Number of stored entries, expired ones included
    pub async fn size(&self) -> Result<usize, ApplicationError> {
        if !self.cache_dir.exists() {
            return Ok(0);
        }

        let mut entries = fs::read_dir(&self.cache_dir).await?;
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Delete every transient
    pub async fn clear_all(&self) -> Result<(), ApplicationError> {
        if !self.cache_dir.exists() {
            return Ok(());
        }

        let mut entries = fs::read_dir(&self.cache_dir).await?;
        let mut removed = 0u64;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path
                .extension()
                .is_some_and(|ext| ext == "json" || ext == "tmp")
                && Self::remove_if_present(&path).await?
            {
                removed += 1;
            }
        }

        self.stats.lock().await.total_entries = 0;
        info!("Cleared {} transients from {:?}", removed, self.cache_dir);
        Ok(())
    }

    /// Remove expired and unreadable entries, returning how many were removed
    pub async fn cleanup_expired(&self) -> Result<u64, ApplicationError> {
        if !self.cache_dir.exists() {
            return Ok(0);
        }

        let mut entries = fs::read_dir(&self.cache_dir).await?;
        let mut cleaned = 0u64;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }

            let expired = match fs::read_to_string(&path).await {
                Ok(content) => serde_json::from_str::<TransientEntry<serde_json::Value>>(&content)
                    .map(|e| e.is_expired())
                    .unwrap_or(true),
                Err(e) => {
                    warn!("Failed to read transient {:?}: {}", path, e);
                    false
                }
            };

            if expired && Self::remove_if_present(&path).await? {
                cleaned += 1;
                debug!("Removed expired transient {:?}", path);
            }
        }

        let mut stats = self.stats.lock().await;
        stats.expired_entries += cleaned;
        stats.total_entries = stats.total_entries.saturating_sub(cleaned);
        stats.cleanup_runs += 1;
        Ok(cleaned)
    }

    /// Periodically remove expired transients
    pub fn start_background_cleanup(
        self: Arc<Self>,
        every: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(every);
            loop {
                ticker.tick().await;
                match self.cleanup_expired().await {
                    Ok(0) => debug!("Transient cleanup found nothing to remove"),
                    Ok(n) => info!("Transient cleanup removed {} entries", n),
                    Err(e) => error!("Transient cleanup failed: {}", e),
                }
            }
        })
    }
}

#[async_trait]
impl CacheService for FileTransientStore {
    async fn get<T>(&self, key: &str) -> Result<Option<T>, ApplicationError>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        let file_key = Self::file_key(key);
        let path = self.entry_path(&file_key);

        let lock = self.lock_for(&file_key).await;
        let _guard = lock.lock().await;

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.stats.lock().await.misses += 1;
                return Ok(None);
            }
            Err(e) => {
                error!("Failed to read transient {:?}: {}", path, e);
                return Err(ApplicationError::Io(e));
            }
        };

        let entry: TransientEntry<serde_json::Value> = serde_json::from_str(&content)?;
        if entry.is_expired() {
            Self::remove_if_present(&path).await?;
            let mut stats = self.stats.lock().await;
            stats.misses += 1;
            stats.expired_entries += 1;
            stats.total_entries = stats.total_entries.saturating_sub(1);
            return Ok(None);
        }

        let value: T = serde_json::from_value(entry.data)?;
        self.stats.lock().await.hits += 1;
        debug!("Transient hit for key: {}", key);
        Ok(Some(value))
    }

    async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), ApplicationError>
    where
        T: serde::Serialize + Send + Sync,
    {
        self.ensure_cache_dir().await?;

        let file_key = Self::file_key(key);
        let lock = self.lock_for(&file_key).await;
        let _guard = lock.lock().await;

        let now = Self::current_timestamp();
        let entry = TransientEntry {
            data: serde_json::to_value(value)?,
            created_at: now,
            expires_at: now + ttl.as_secs(),
        };

        let temp_path = self.temp_path(&file_key);
        let final_path = self.entry_path(&file_key);
        let replaced = final_path.exists();
        fs::write(&temp_path, serde_json::to_vec(&entry)?).await?;
        fs::rename(&temp_path, &final_path).await?;

        if !replaced {
            self.stats.lock().await.total_entries += 1;
        }
        debug!("Stored transient {} (expires in {}s)", key, ttl.as_secs());
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<(), ApplicationError> {
        let file_key = Self::file_key(key);
        let lock = self.lock_for(&file_key).await;
        let _guard = lock.lock().await;

        if Self::remove_if_present(&self.entry_path(&file_key)).await? {
            let mut stats = self.stats.lock().await;
            stats.total_entries = stats.total_entries.saturating_sub(1);
            debug!("Deleted transient {}", key);
        }
        Ok(())
    }
}
