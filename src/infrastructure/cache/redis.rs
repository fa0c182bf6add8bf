//! Redis cache implementation

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use crate::domain::DomainError;
use crate::domain::cache::{Cache, EntryTtl};

/// Configuration for Redis cache
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    /// Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub url: String,
    /// Key prefix for namespacing
    pub key_prefix: Option<String>,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: None,
        }
    }
}

impl RedisCacheConfig {
    /// Creates a new configuration with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }
}

/// Redis cache implementation
///
/// Features:
/// - TTL support per entry (`SET` / `SET EX`, `PERSIST` for zero)
/// - Atomic set-if-absent via `SET NX`
/// - Key enumeration via `SCAN`
/// - Connection pooling via ConnectionManager
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
    config: RedisCacheConfig,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("config", &self.config)
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisCache {
    /// Creates a new Redis cache connection
    pub async fn new(config: RedisCacheConfig) -> Result<Self, DomainError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| DomainError::cache(format!("Failed to create Redis client: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| DomainError::cache(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self { connection, config })
    }

    fn prefix_key(&self, key: &str) -> String {
        prefix_key(self.config.key_prefix.as_deref(), key)
    }

    fn strip_prefix(&self, key: String) -> String {
        match &self.config.key_prefix {
            Some(prefix) => key
                .strip_prefix(&format!("{}:", prefix))
                .map(str::to_string)
                .unwrap_or(key),
            None => key,
        }
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, DomainError> {
        let mut conn = self.connection.clone();

        // Use SCAN to find matching keys (safer than KEYS for production)
        let mut cursor = 0u64;
        let mut found = Vec::new();

        loop {
            let (new_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(1000)
                .query_async(&mut conn)
                .await
                .map_err(|e| {
                    DomainError::cache(format!(
                        "Failed to scan keys with pattern '{}': {}",
                        pattern, e
                    ))
                })?;

            found.extend(keys);
            cursor = new_cursor;

            if cursor == 0 {
                break;
            }
        }

        Ok(found)
    }
}

fn prefix_key(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}:{}", prefix, key),
        None => key.to_string(),
    }
}

/// Maps a `TTL` reply: -2 = missing key, -1 = no expiry
fn ttl_from_reply(ttl_secs: i64) -> Option<EntryTtl> {
    match ttl_secs {
        -2 => None,
        secs if secs < 0 => Some(EntryTtl::Persistent),
        secs => Some(EntryTtl::Expires(Duration::from_secs(secs as u64))),
    }
}

/// Redis expiries have second granularity; sub-second TTLs round up to 1s
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl Cache for RedisCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError> {
        let prefixed_key = self.prefix_key(key);
        let mut conn = self.connection.clone();

        let result: Option<String> = conn
            .get(&prefixed_key)
            .await
            .map_err(|e| DomainError::cache(format!("Failed to get key '{}': {}", key, e)))?;

        Ok(result)
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        let prefixed_key = self.prefix_key(key);
        let mut conn = self.connection.clone();

        let result: redis::RedisResult<()> = if ttl.is_zero() {
            conn.set(&prefixed_key, value).await
        } else {
            conn.set_ex(&prefixed_key, value, ttl_secs(ttl)).await
        };

        result.map_err(|e| DomainError::cache(format!("Failed to set key '{}': {}", key, e)))
    }

    async fn set_nx_raw(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, DomainError> {
        let prefixed_key = self.prefix_key(key);
        let mut conn = self.connection.clone();

        // Use SET NX [EX] for atomic set-if-not-exists with TTL
        let mut cmd = redis::cmd("SET");
        cmd.arg(&prefixed_key).arg(value).arg("NX");

        if !ttl.is_zero() {
            cmd.arg("EX").arg(ttl_secs(ttl));
        }

        let result: Option<String> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::cache(format!("Failed to set_nx key '{}': {}", key, e)))?;

        // Redis returns "OK" if set, None if key existed
        Ok(result.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, DomainError> {
        let prefixed_key = self.prefix_key(key);
        let mut conn = self.connection.clone();

        let deleted: i32 = conn
            .del(&prefixed_key)
            .await
            .map_err(|e| DomainError::cache(format!("Failed to delete key '{}': {}", key, e)))?;

        Ok(deleted > 0)
    }

    async fn remove_many(&self, keys: &[String]) -> Result<Option<String>, DomainError> {
        let Some(last) = keys.last() else {
            return Ok(None);
        };

        let last_value = self.get_raw(last).await?;

        let prefixed: Vec<String> = keys.iter().map(|key| self.prefix_key(key)).collect();
        let mut conn = self.connection.clone();

        let _: i64 = conn
            .del(&prefixed)
            .await
            .map_err(|e| DomainError::cache(format!("Failed to delete keys: {}", e)))?;

        Ok(last_value)
    }

    async fn exists(&self, key: &str) -> Result<bool, DomainError> {
        let prefixed_key = self.prefix_key(key);
        let mut conn = self.connection.clone();

        let exists: bool = conn.exists(&prefixed_key).await.map_err(|e| {
            DomainError::cache(format!("Failed to check existence of key '{}': {}", key, e))
        })?;

        Ok(exists)
    }

    async fn keys(&self) -> Result<Vec<String>, DomainError> {
        let keys = self.scan(&self.prefix_key("*")).await?;
        Ok(keys.into_iter().map(|key| self.strip_prefix(key)).collect())
    }

    async fn size(&self) -> Result<usize, DomainError> {
        match &self.config.key_prefix {
            // Count keys matching our prefix
            Some(_) => Ok(self.scan(&self.prefix_key("*")).await?.len()),
            None => {
                let mut conn = self.connection.clone();
                let size: usize = redis::cmd("DBSIZE")
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| {
                        DomainError::cache(format!("Failed to get database size: {}", e))
                    })?;
                Ok(size)
            }
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<EntryTtl>, DomainError> {
        let prefixed_key = self.prefix_key(key);
        let mut conn = self.connection.clone();

        let ttl_secs: i64 = conn.ttl(&prefixed_key).await.map_err(|e| {
            DomainError::cache(format!("Failed to get TTL for key '{}': {}", key, e))
        })?;

        Ok(ttl_from_reply(ttl_secs))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, DomainError> {
        let prefixed_key = self.prefix_key(key);
        let mut conn = self.connection.clone();

        if ttl.is_zero() {
            // PERSIST answers 0 for keys without a TTL, so check existence separately
            let _: bool = conn.persist(&prefixed_key).await.map_err(|e| {
                DomainError::cache(format!("Failed to persist key '{}': {}", key, e))
            })?;
            return self.exists(key).await;
        }

        let updated: bool = conn
            .expire(&prefixed_key, ttl_secs(ttl) as i64)
            .await
            .map_err(|e| {
                DomainError::cache(format!("Failed to update TTL for key '{}': {}", key, e))
            })?;

        Ok(updated)
    }

    async fn clear(&self) -> Result<(), DomainError> {
        // If we have a prefix, only clear prefixed keys
        // Otherwise, flush the entire database (use with caution!)
        match &self.config.key_prefix {
            Some(_) => {
                let keys = self.scan(&self.prefix_key("*")).await?;

                if !keys.is_empty() {
                    let mut conn = self.connection.clone();
                    let _: i64 = conn
                        .del(&keys)
                        .await
                        .map_err(|e| DomainError::cache(format!("Failed to delete keys: {}", e)))?;
                }
            }
            None => {
                let mut conn = self.connection.clone();
                redis::cmd("FLUSHDB")
                    .query_async::<()>(&mut conn)
                    .await
                    .map_err(|e| DomainError::cache(format!("Failed to flush database: {}", e)))?;
            }
        }

        Ok(())
    }
}
