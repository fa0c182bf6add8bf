//! Cache trait definition

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::domain::DomainError;

/// Remaining lifetime of a stored entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTtl {
    /// The entry never expires
    Persistent,
    /// The entry expires after the given duration
    Expires(Duration),
}

impl EntryTtl {
    /// Converts back to the `set_raw` convention (zero = no expiry).
    ///
    /// An expiring entry never maps to zero, even when it is about to lapse.
    pub fn as_duration(&self) -> Duration {
        match self {
            Self::Persistent => Duration::ZERO,
            Self::Expires(ttl) => (*ttl).max(Duration::from_millis(1)),
        }
    }
}

/// Key-value backend contract the tag layer is written against
///
/// Values travel as JSON strings so the trait stays dyn-compatible.
/// A TTL of `Duration::ZERO` means the entry never expires.
#[async_trait]
pub trait Cache: Send + Sync + Debug {
    /// Gets a raw JSON value from the cache
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError>;

    /// Sets a raw JSON value in the cache with a TTL
    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError>;

    /// Atomically sets a value only if the key doesn't exist
    async fn set_nx_raw(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, DomainError>;

    /// Deletes a value from the cache
    async fn delete(&self, key: &str) -> Result<bool, DomainError>;

    /// Deletes all given keys, returning the value held by the last one
    async fn remove_many(&self, keys: &[String]) -> Result<Option<String>, DomainError> {
        let Some(last) = keys.last() else {
            return Ok(None);
        };

        let last_value = self.get_raw(last).await?;

        for key in keys {
            self.delete(key).await?;
        }

        Ok(last_value)
    }

    /// Checks if a key exists in the cache
    async fn exists(&self, key: &str) -> Result<bool, DomainError> {
        Ok(self.get_raw(key).await?.is_some())
    }

    /// Lists every live key
    async fn keys(&self) -> Result<Vec<String>, DomainError>;

    /// Returns the number of live entries
    async fn size(&self) -> Result<usize, DomainError> {
        Ok(self.keys().await?.len())
    }

    /// Gets the remaining TTL for a key, `None` when the key is absent
    async fn ttl(&self, key: &str) -> Result<Option<EntryTtl>, DomainError>;

    /// Updates the TTL for an existing key; zero makes it persistent
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, DomainError>;

    /// Clears all entries from the cache
    async fn clear(&self) -> Result<(), DomainError>;
}

/// Extension trait providing typed get/set operations
pub trait CacheExt: Cache {
    /// Gets a typed value from the cache
    fn get<'a, V>(
        &'a self,
        key: &'a str,
    ) -> impl std::future::Future<Output = Result<Option<V>, DomainError>> + Send
    where
        V: DeserializeOwned + Send,
    {
        async move {
            match self.get_raw(key).await? {
                Some(data) => Ok(Some(decode_value(&data)?)),
                None => Ok(None),
            }
        }
    }

    /// Sets a typed value in the cache with a TTL
    fn set<'a, V>(
        &'a self,
        key: &'a str,
        value: &'a V,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<(), DomainError>> + Send
    where
        V: Serialize + Send + Sync,
    {
        async move {
            let data = encode_value(value)?;
            self.set_raw(key, &data, ttl).await
        }
    }

    /// Sets a value only if the key doesn't exist
    fn set_nx<'a, V>(
        &'a self,
        key: &'a str,
        value: &'a V,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<bool, DomainError>> + Send
    where
        V: Serialize + Send + Sync,
    {
        async move {
            let data = encode_value(value)?;
            self.set_nx_raw(key, &data, ttl).await
        }
    }
}

// Blanket implementation for all types implementing Cache
impl<T: Cache + ?Sized> CacheExt for T {}

pub(crate) fn encode_value<V: Serialize + ?Sized>(value: &V) -> Result<String, DomainError> {
    serde_json::to_string(value)
        .map_err(|e| DomainError::cache(format!("Failed to serialize cache value: {}", e)))
}

pub(crate) fn decode_value<V: DeserializeOwned>(data: &str) -> Result<V, DomainError> {
    serde_json::from_str(data)
        .map_err(|e| DomainError::cache(format!("Failed to deserialize cache value: {}", e)))
}
