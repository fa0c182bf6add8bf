//! Disk-backed cache implementation using cacache
//!
//! Values are stored as content-addressed blobs and keys live in the cacache
//! index. Expiry is carried in each index entry's metadata. Reads never
//! modify the cache: an expired entry reads as absent and stays on disk
//! until it is overwritten, deleted or cleared.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use cacache::{Integrity, Metadata, WriteOpts};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::domain::DomainError;
use crate::domain::cache::{Cache, EntryTtl};

/// Configuration for disk cache
#[derive(Debug, Clone)]
pub struct DiskCacheConfig {
    /// Directory holding the cacache index and content
    pub path: PathBuf,
}

impl DiskCacheConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Per-entry metadata stored in the cacache index
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    /// Expiration timestamp (millis since epoch), `None` for persistent entries
    expires_at: Option<u64>,
}

impl EntryMeta {
    fn new(ttl: Duration) -> Self {
        Self {
            expires_at: expiry_from_now(ttl),
        }
    }

    fn decode(metadata: &Metadata) -> Result<Self, DomainError> {
        serde_json::from_value(metadata.metadata.clone()).map_err(|e| {
            DomainError::cache(format!(
                "Corrupt metadata for cache key '{}': {}",
                metadata.key, e
            ))
        })
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| current_time_millis() >= expires_at)
    }

    fn remaining(&self) -> EntryTtl {
        match self.expires_at {
            Some(expires_at) => EntryTtl::Expires(Duration::from_millis(
                expires_at.saturating_sub(current_time_millis()),
            )),
            None => EntryTtl::Persistent,
        }
    }
}

fn current_time_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn expiry_from_now(ttl: Duration) -> Option<u64> {
    if ttl.is_zero() {
        None
    } else {
        Some(current_time_millis() + ttl.as_millis() as u64)
    }
}

fn cacache_error(action: &str, key: &str, e: cacache::Error) -> DomainError {
    DomainError::cache(format!("Failed to {} '{}': {}", action, key, e))
}

/// Cache persisted in a cacache directory
///
/// cacache makes each content and index write atomic. Mutations are also
/// serialized by an in-process lock, which is what makes `set_nx_raw` and
/// `expire` atomic. Several processes sharing a directory get no such
/// guarantee.
#[derive(Debug)]
pub struct DiskCache {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl DiskCache {
    /// Opens (and creates if needed) a disk cache directory
    pub async fn new(config: DiskCacheConfig) -> Result<Self, DomainError> {
        tokio::fs::create_dir_all(&config.path).await.map_err(|e| {
            DomainError::cache(format!(
                "Failed to create cache directory '{}': {}",
                config.path.display(),
                e
            ))
        })?;

        Ok(Self {
            root: config.path,
            write_lock: Mutex::new(()),
        })
    }

    /// Index entry and its decoded metadata, `None` when absent or expired
    async fn live_entry(&self, key: &str) -> Result<Option<(Metadata, EntryMeta)>, DomainError> {
        let Some(metadata) = cacache::metadata(&self.root, key)
            .await
            .map_err(|e| cacache_error("read index for", key, e))?
        else {
            return Ok(None);
        };

        let meta = EntryMeta::decode(&metadata)?;
        if meta.is_expired() {
            return Ok(None);
        }

        Ok(Some((metadata, meta)))
    }

    async fn index_entry(
        &self,
        key: &str,
        integrity: Integrity,
        size: usize,
        ttl: Duration,
    ) -> Result<(), DomainError> {
        let meta = serde_json::to_value(EntryMeta::new(ttl))
            .map_err(|e| DomainError::cache(format!("Failed to encode entry metadata: {}", e)))?;

        let opts = WriteOpts::new().integrity(integrity).size(size).metadata(meta);

        cacache::index::insert_async(&self.root, key, opts)
            .await
            .map_err(|e| cacache_error("index", key, e))?;

        Ok(())
    }

    async fn write_entry(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        let integrity = cacache::write_hash(&self.root, value.as_bytes())
            .await
            .map_err(|e| cacache_error("write content for", key, e))?;

        self.index_entry(key, integrity, value.len(), ttl).await
    }
}

#[async_trait]
impl Cache for DiskCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError> {
        let Some((metadata, _)) = self.live_entry(key).await? else {
            return Ok(None);
        };

        let data = cacache::read_hash(&self.root, &metadata.integrity)
            .await
            .map_err(|e| cacache_error("read content for", key, e))?;

        String::from_utf8(data)
            .map(Some)
            .map_err(|e| DomainError::cache(format!("Cache value for '{}' is not UTF-8: {}", key, e)))
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock().await;
        self.write_entry(key, value, ttl).await
    }

    async fn set_nx_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, DomainError> {
        let _guard = self.write_lock.lock().await;

        if self.live_entry(key).await?.is_some() {
            return Ok(false);
        }

        self.write_entry(key, value, ttl).await?;
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        let _guard = self.write_lock.lock().await;

        let Some(metadata) = cacache::metadata(&self.root, key)
            .await
            .map_err(|e| cacache_error("read index for", key, e))?
        else {
            return Ok(false);
        };

        // Unreadable metadata still gets removed and counts as present
        let live = EntryMeta::decode(&metadata).map_or(true, |meta| !meta.is_expired());

        cacache::remove(&self.root, key)
            .await
            .map_err(|e| cacache_error("remove", key, e))?;

        Ok(live)
    }

    async fn remove_many(&self, keys: &[String]) -> Result<Option<String>, DomainError> {
        let Some(last) = keys.last() else {
            return Ok(None);
        };

        let last_value = match self.get_raw(last).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %last, error = %e, "Removing unreadable cache entry");
                None
            }
        };

        for key in keys {
            self.delete(key).await?;
        }

        Ok(last_value)
    }

    async fn keys(&self) -> Result<Vec<String>, DomainError> {
        let root = self.root.clone();
        let listed: Vec<Result<Metadata, cacache::Error>> =
            tokio::task::spawn_blocking(move || cacache::list_sync(&root).collect())
                .await
                .map_err(|e| DomainError::internal(format!("Failed to list disk cache: {}", e)))?;

        let mut keys = Vec::new();

        for item in listed {
            let metadata = item
                .map_err(|e| DomainError::cache(format!("Failed to list disk cache: {}", e)))?;

            match EntryMeta::decode(&metadata) {
                Ok(meta) if !meta.is_expired() => keys.push(metadata.key),
                Ok(_) => {}
                Err(e) => warn!(key = %metadata.key, error = %e, "Skipping unreadable cache entry"),
            }
        }

        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> Result<Option<EntryTtl>, DomainError> {
        Ok(self.live_entry(key).await?.map(|(_, meta)| meta.remaining()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, DomainError> {
        let _guard = self.write_lock.lock().await;

        let Some((metadata, _)) = self.live_entry(key).await? else {
            return Ok(false);
        };

        // Content is addressed by hash, so only the index entry is rewritten
        self.index_entry(key, metadata.integrity, metadata.size, ttl)
            .await?;
        Ok(true)
    }

    async fn clear(&self) -> Result<(), DomainError> {
        let _guard = self.write_lock.lock().await;

        cacache::clear(&self.root)
            .await
            .map_err(|e| DomainError::cache(format!("Failed to clear disk cache: {}", e)))
    }
}
