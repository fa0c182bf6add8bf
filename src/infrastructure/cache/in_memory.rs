//! In-memory cache implementation using moka

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache as MokaCache;
use moka::ops::compute::{CompResult, Op};

use crate::domain::DomainError;
use crate::domain::cache::{Cache, EntryTtl};

/// Configuration for in-memory cache
///
/// Capacity and idle eviction apply to tag index entries like any other key.
/// An evicted index forgets its members, which then survive `remove_by_tag`
/// until they expire on their own. Size `max_capacity` for values plus one
/// entry per live tag, and leave `time_to_idle` unset when tags are used.
#[derive(Debug, Clone)]
pub struct InMemoryCacheConfig {
    /// Maximum number of entries, tag index entries included
    pub max_capacity: u64,
    /// Time to idle - entries not accessed for this duration are evicted
    pub time_to_idle: Option<Duration>,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            time_to_idle: None,
        }
    }
}

impl InMemoryCacheConfig {
    /// Creates a new configuration with specified max capacity
    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }

    /// Sets the time-to-idle duration
    pub fn with_time_to_idle(mut self, tti: Duration) -> Self {
        self.time_to_idle = Some(tti);
        self
    }
}

/// Cache entry stored in moka
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Serialized JSON value
    data: String,
    /// Expiration timestamp (millis since epoch), `None` for persistent entries
    expires_at: Option<u64>,
}

impl CacheEntry {
    fn new(data: String, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: expiry_from_now(ttl),
        }
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

/// Thread-safe in-memory cache implementation using moka
///
/// Features:
/// - Per-entry TTL, with zero meaning the entry never expires
/// - Capacity-bounded eviction
/// - Atomic set-if-absent through moka's compute API
/// - Optional time-to-idle eviction
#[derive(Debug)]
pub struct InMemoryCache {
    cache: MokaCache<String, CacheEntry>,
    config: InMemoryCacheConfig,
}

impl InMemoryCache {
    /// Creates a new in-memory cache with default configuration
    pub fn new() -> Self {
        Self::with_config(InMemoryCacheConfig::default())
    }

    /// Creates a new in-memory cache with the given configuration
    pub fn with_config(config: InMemoryCacheConfig) -> Self {
        let mut builder = MokaCache::builder().max_capacity(config.max_capacity);

        if let Some(tti) = config.time_to_idle {
            builder = builder.time_to_idle(tti);
        }

        Self {
            cache: builder.build(),
            config,
        }
    }

    pub fn config(&self) -> &InMemoryCacheConfig {
        &self.config
    }

    async fn live_entry(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.cache.get(key).await?;

        if entry.is_expired() {
            self.cache.remove(key).await;
            return None;
        }

        Some(entry)
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError> {
        Ok(self.live_entry(key).await.map(|entry| entry.data))
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        self.cache
            .insert(key.to_string(), CacheEntry::new(value.to_string(), ttl))
            .await;
        Ok(())
    }

    async fn set_nx_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, DomainError> {
        let result = self
            .cache
            .entry_by_ref(key)
            .and_compute_with(|existing| {
                let op = match existing {
                    Some(entry) if !entry.value().is_expired() => Op::Nop,
                    _ => Op::Put(CacheEntry::new(value.to_string(), ttl)),
                };
                std::future::ready(op)
            })
            .await;

        Ok(matches!(
            result,
            CompResult::Inserted(_) | CompResult::ReplacedWith(_)
        ))
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        let removed = self.cache.remove(key).await;
        Ok(removed.is_some_and(|entry| !entry.is_expired()))
    }

    async fn exists(&self, key: &str) -> Result<bool, DomainError> {
        Ok(self.live_entry(key).await.is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, DomainError> {
        // Sync pending tasks first
        self.cache.run_pending_tasks().await;

        // Use blocking task to iterate over cache entries
        let cache_clone = self.cache.clone();
        let keys: Vec<String> = tokio::task::spawn_blocking(move || {
            cache_clone
                .iter()
                .filter(|(_, entry)| !entry.is_expired())
                .map(|(k, _)| k.as_ref().clone())
                .collect()
        })
        .await
        .map_err(|e| DomainError::internal(format!("Failed to iterate cache: {}", e)))?;

        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> Result<Option<EntryTtl>, DomainError> {
        Ok(self.live_entry(key).await.map(|entry| entry.remaining()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, DomainError> {
        let result = self
            .cache
            .entry_by_ref(key)
            .and_compute_with(|existing| {
                let op = match existing {
                    Some(entry) if !entry.value().is_expired() => {
                        Op::Put(CacheEntry::new(entry.into_value().data, ttl))
                    }
                    Some(_) => Op::Remove,
                    None => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;

        Ok(matches!(result, CompResult::ReplacedWith(_)))
    }

    async fn clear(&self) -> Result<(), DomainError> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}
