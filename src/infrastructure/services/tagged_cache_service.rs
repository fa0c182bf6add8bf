//! Tag-aware cache service

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::domain::DomainError;
use crate::domain::cache::{Cache, CacheExt, EntryTtl, decode_value, encode_value};
use crate::domain::tag::{Tag, TagIndex, TagMembers};

/// Configuration for a tagged cache instance
#[derive(Debug, Clone)]
pub struct TaggedCacheConfig {
    /// Prefix scoping this instance's tag index keys
    pub prefix: String,
    /// Upper bound on waiting for the tag index lock
    pub lock_timeout: Option<Duration>,
}

impl Default for TaggedCacheConfig {
    fn default() -> Self {
        Self {
            prefix: "pmp".to_string(),
            lock_timeout: None,
        }
    }
}

impl TaggedCacheConfig {
    /// Creates a config with the given instance prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the tag index lock timeout
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }
}

/// Cache facade adding tag-based invalidation on top of any [`Cache`] backend
///
/// A TTL of `Duration::ZERO` stores an entry without expiry. Tagged writes
/// go through the instance's [`TagIndex`]; untagged calls reach the backend
/// directly.
#[derive(Debug)]
pub struct TaggedCacheService {
    cache: Arc<dyn Cache>,
    index: TagIndex,
}

impl TaggedCacheService {
    /// Creates a new tagged cache with the default config
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self::with_config(cache, TaggedCacheConfig::default())
    }

    /// Creates a new tagged cache with custom config
    pub fn with_config(cache: Arc<dyn Cache>, config: TaggedCacheConfig) -> Self {
        let mut index = TagIndex::new(cache.clone(), config.prefix);

        if let Some(timeout) = config.lock_timeout {
            index = index.with_lock_timeout(timeout);
        }

        Self { cache, index }
    }

    pub fn index(&self) -> &TagIndex {
        &self.index
    }

    /// Stores `value` under `key`, recording the key under `tag` first
    pub async fn set<V>(
        &self,
        key: &str,
        value: &V,
        ttl: Duration,
        tag: Option<&Tag>,
    ) -> Result<(), DomainError>
    where
        V: Serialize + ?Sized,
    {
        let data = encode_value(value)?;

        debug!(key = %key, tagged = tag.is_some(), "Setting cache entry");

        self.index
            .write_tagged(key, tag, || self.cache.set_raw(key, &data, ttl))
            .await
    }

    /// Stores `value` only if `key` is absent. The tag is recorded either way.
    pub async fn set_if_not_exist<V>(
        &self,
        key: &str,
        value: &V,
        ttl: Duration,
        tag: Option<&Tag>,
    ) -> Result<bool, DomainError>
    where
        V: Serialize + ?Sized,
    {
        let data = encode_value(value)?;

        self.index
            .write_tagged(key, tag, || self.cache.set_nx_raw(key, &data, ttl))
            .await
    }

    /// Gets a typed value
    pub async fn get<V>(&self, key: &str) -> Result<Option<V>, DomainError>
    where
        V: DeserializeOwned + Send,
    {
        self.cache.get(key).await
    }

    /// Returns the stored value, or stores and returns `value` when absent
    pub async fn get_or_set<V>(
        &self,
        key: &str,
        value: V,
        ttl: Duration,
        tag: Option<&Tag>,
    ) -> Result<V, DomainError>
    where
        V: Serialize + DeserializeOwned,
    {
        let data = encode_value(&value)?;

        self.index
            .write_tagged(key, tag, || async move {
                match self.store_if_absent(key, &data, ttl).await? {
                    Some(existing) => decode_value(&existing),
                    None => Ok(value),
                }
            })
            .await
    }

    /// Returns the stored value, or runs `producer` and stores its result.
    ///
    /// A producer yielding `None` stores nothing and `None` is returned.
    pub async fn get_or_set_with<V, F, Fut>(
        &self,
        key: &str,
        producer: F,
        ttl: Duration,
        tag: Option<&Tag>,
    ) -> Result<Option<V>, DomainError>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, DomainError>>,
    {
        self.index
            .write_tagged(key, tag, || async move {
                if let Some(existing) = self.cache.get_raw(key).await? {
                    return decode_value(&existing).map(Some);
                }

                let Some(value) = producer().await? else {
                    debug!(key = %key, "Producer returned no value, nothing cached");
                    return Ok(None);
                };

                match self.store_if_absent(key, &encode_value(&value)?, ttl).await? {
                    Some(existing) => decode_value(&existing).map(Some),
                    None => Ok(Some(value)),
                }
            })
            .await
    }

    /// Checks if `key` holds a live value
    pub async fn contains(&self, key: &str) -> Result<bool, DomainError> {
        self.cache.exists(key).await
    }

    /// Deletes `key`, returning the value it held
    pub async fn remove<V>(&self, key: &str) -> Result<Option<V>, DomainError>
    where
        V: DeserializeOwned,
    {
        match self.cache.remove_many(&[key.to_string()]).await? {
            Some(previous) => decode_value(&previous).map(Some),
            None => Ok(None),
        }
    }

    /// Deletes every key in `keys`
    pub async fn removes(&self, keys: &[String]) -> Result<(), DomainError> {
        self.cache.remove_many(keys).await?;
        Ok(())
    }

    /// Deletes all keys tagged with `tag`, returning how many were listed
    pub async fn remove_by_tag(&self, tag: &Tag) -> Result<usize, DomainError> {
        self.index.remove_by_tag(tag).await
    }

    /// Deletes all keys tagged with any of `tags`, one tag at a time
    pub async fn remove_by_tags(&self, tags: &[Tag]) -> Result<usize, DomainError> {
        self.index.remove_by_tags(tags).await
    }

    /// Lists the keys currently recorded under `tag`
    pub async fn tag_members(&self, tag: &Tag) -> Result<TagMembers, DomainError> {
        self.index.members(tag).await
    }

    /// Replaces the value of an existing key, keeping its remaining TTL.
    ///
    /// Returns the previous value and whether the key existed.
    pub async fn update<V>(&self, key: &str, value: &V) -> Result<(Option<V>, bool), DomainError>
    where
        V: Serialize + DeserializeOwned,
    {
        let Some(ttl) = self.cache.ttl(key).await? else {
            return Ok((None, false));
        };

        let Some(previous) = self.cache.get_raw(key).await? else {
            return Ok((None, false));
        };

        self.cache
            .set_raw(key, &encode_value(value)?, ttl.as_duration())
            .await?;

        Ok((Some(decode_value(&previous)?), true))
    }

    /// Changes the TTL of `key`, returning the TTL it had (`None` when absent)
    pub async fn update_expire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<EntryTtl>, DomainError> {
        let Some(previous) = self.cache.ttl(key).await? else {
            return Ok(None);
        };

        if !self.cache.expire(key, ttl).await? {
            return Ok(None);
        }

        Ok(Some(previous))
    }

    /// Gets the remaining TTL of `key`
    pub async fn get_expire(&self, key: &str) -> Result<Option<EntryTtl>, DomainError> {
        self.cache.ttl(key).await
    }

    /// Lists all keys, tag index entries included
    pub async fn keys(&self) -> Result<Vec<String>, DomainError> {
        self.cache.keys().await
    }

    /// Returns every live value as JSON
    pub async fn values(&self) -> Result<Vec<serde_json::Value>, DomainError> {
        Ok(self.data().await?.into_values().collect())
    }

    /// Returns a snapshot of every live entry as JSON
    pub async fn data(&self) -> Result<HashMap<String, serde_json::Value>, DomainError> {
        let mut data = HashMap::new();

        for key in self.cache.keys().await? {
            // Entries may expire or be removed between listing and reading
            if let Some(raw) = self.cache.get_raw(&key).await? {
                data.insert(key, decode_value(&raw)?);
            }
        }

        Ok(data)
    }

    /// Returns the number of live entries
    pub async fn size(&self) -> Result<usize, DomainError> {
        self.cache.size().await
    }

    /// Removes every entry from the backend
    pub async fn clear(&self) -> Result<(), DomainError> {
        self.cache.clear().await
    }

    /// Stores `data` unless `key` already holds a value, which is then returned
    async fn store_if_absent(
        &self,
        key: &str,
        data: &str,
        ttl: Duration,
    ) -> Result<Option<String>, DomainError> {
        if let Some(existing) = self.cache.get_raw(key).await? {
            return Ok(Some(existing));
        }

        if self.cache.set_nx_raw(key, data, ttl).await? {
            return Ok(None);
        }

        // Another writer got there between the read and the conditional set
        self.cache.get_raw(key).await
    }
}
