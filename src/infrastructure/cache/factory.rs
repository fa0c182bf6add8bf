//! Cache factory for runtime selection

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::DomainError;
use crate::domain::cache::Cache;

use super::disk::{DiskCache, DiskCacheConfig};
use super::in_memory::{InMemoryCache, InMemoryCacheConfig};
use super::redis::{RedisCache, RedisCacheConfig};

/// Supported cache types
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CacheType {
    /// In-memory cache using moka
    #[default]
    InMemory,
    /// Redis cache
    Redis,
    /// cacache-backed cache in a local directory
    Disk,
}

impl std::fmt::Display for CacheType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheType::InMemory => write!(f, "in_memory"),
            CacheType::Redis => write!(f, "redis"),
            CacheType::Disk => write!(f, "disk"),
        }
    }
}

impl std::str::FromStr for CacheType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(CacheType::InMemory),
            "redis" => Ok(CacheType::Redis),
            "disk" | "file" => Ok(CacheType::Disk),
            _ => Err(DomainError::configuration(format!(
                "Unknown cache type: {}. Valid types: in_memory, redis, disk",
                s
            ))),
        }
    }
}

/// Configuration for cache factory
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// Type of cache to create
    pub cache_type: CacheType,
    /// Redis URL (required for Redis type)
    pub redis_url: Option<String>,
    /// Directory (required for Disk type)
    pub disk_path: Option<PathBuf>,
    /// Redis key prefix for namespacing
    pub key_prefix: Option<String>,
    /// Maximum capacity (for in-memory cache)
    pub max_capacity: Option<u64>,
    /// Time to idle (for in-memory cache)
    pub time_to_idle: Option<Duration>,
}

impl CacheConfig {
    /// Creates a new configuration for in-memory cache
    pub fn in_memory() -> Self {
        Self {
            cache_type: CacheType::InMemory,
            ..Default::default()
        }
    }

    /// Creates a new configuration for Redis cache
    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            cache_type: CacheType::Redis,
            redis_url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Creates a new configuration for disk cache
    pub fn disk(path: impl Into<PathBuf>) -> Self {
        Self {
            cache_type: CacheType::Disk,
            disk_path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Sets the key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    /// Sets the maximum capacity (in-memory only)
    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = Some(capacity);
        self
    }

    /// Sets the time-to-idle (in-memory only)
    pub fn with_time_to_idle(mut self, tti: Duration) -> Self {
        self.time_to_idle = Some(tti);
        self
    }

    /// Creates config from environment variables
    pub fn from_env() -> Result<Self, DomainError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Creates config from `CACHE_*` style variables resolved by `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DomainError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cache_type = lookup("CACHE_TYPE")
            .unwrap_or_else(|| "in_memory".to_string())
            .parse()?;

        let max_capacity = lookup("CACHE_MAX_CAPACITY").and_then(|v| v.parse().ok());

        Ok(Self {
            cache_type,
            redis_url: lookup("REDIS_URL"),
            disk_path: lookup("CACHE_DISK_PATH").map(PathBuf::from),
            key_prefix: lookup("CACHE_KEY_PREFIX"),
            max_capacity,
            time_to_idle: None,
        })
    }
}

/// Factory for creating cache instances
#[derive(Debug, Default)]
pub struct CacheFactory;

impl CacheFactory {
    /// Creates a new cache factory
    pub fn new() -> Self {
        Self
    }

    /// Creates a cache instance based on configuration
    pub async fn create(&self, config: &CacheConfig) -> Result<Arc<dyn Cache>, DomainError> {
        match config.cache_type {
            CacheType::InMemory => {
                let mut in_memory_config = InMemoryCacheConfig::default();

                if let Some(capacity) = config.max_capacity {
                    in_memory_config = in_memory_config.with_max_capacity(capacity);
                }

                if let Some(tti) = config.time_to_idle {
                    in_memory_config = in_memory_config.with_time_to_idle(tti);
                }

                Ok(self.create_in_memory_with_config(in_memory_config))
            }
            CacheType::Redis => {
                let url = config.redis_url.clone().ok_or_else(|| {
                    DomainError::configuration("Redis URL is required for Redis cache type")
                })?;

                let mut redis_config = RedisCacheConfig::new(url);

                if let Some(prefix) = &config.key_prefix {
                    redis_config = redis_config.with_key_prefix(prefix.clone());
                }

                self.create_redis_with_config(redis_config).await
            }
            CacheType::Disk => {
                let path = config.disk_path.clone().ok_or_else(|| {
                    DomainError::configuration("A directory is required for disk cache type")
                })?;

                let cache = DiskCache::new(DiskCacheConfig::new(path)).await?;
                Ok(Arc::new(cache))
            }
        }
    }

    /// Creates an in-memory cache with custom configuration
    pub fn create_in_memory_with_config(&self, config: InMemoryCacheConfig) -> Arc<dyn Cache> {
        Arc::new(InMemoryCache::with_config(config))
    }

    /// Creates a Redis cache with custom configuration
    pub async fn create_redis_with_config(
        &self,
        config: RedisCacheConfig,
    ) -> Result<Arc<dyn Cache>, DomainError> {
        let cache = RedisCache::new(config).await?;
        Ok(Arc::new(cache))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::CacheExt;

    #[test]
    fn test_cache_type_from_str() {
        assert_eq!("in_memory".parse::<CacheType>().unwrap(), CacheType::InMemory);
        assert_eq!("inmemory".parse::<CacheType>().unwrap(), CacheType::InMemory);
        assert_eq!("memory".parse::<CacheType>().unwrap(), CacheType::InMemory);
        assert_eq!("redis".parse::<CacheType>().unwrap(), CacheType::Redis);
        assert_eq!("REDIS".parse::<CacheType>().unwrap(), CacheType::Redis);
        assert_eq!("disk".parse::<CacheType>().unwrap(), CacheType::Disk);
    }

    #[test]
    fn test_cache_type_from_str_invalid() {
        let result = "invalid".parse::<CacheType>();
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[test]
    fn test_cache_config_in_memory() {
        let config = CacheConfig::in_memory().with_max_capacity(1000);

        assert_eq!(config.cache_type, CacheType::InMemory);
        assert_eq!(config.max_capacity, Some(1000));
    }

    #[test]
    fn test_cache_config_redis() {
        let config = CacheConfig::redis("redis://localhost:6379").with_key_prefix("myapp");

        assert_eq!(config.cache_type, CacheType::Redis);
        assert_eq!(config.redis_url, Some("redis://localhost:6379".to_string()));
        assert_eq!(config.key_prefix, Some("myapp".to_string()));
    }

    #[tokio::test]
    async fn test_factory_create_in_memory() {
        let factory = CacheFactory::new();
        let config = CacheConfig::in_memory();

        let cache = factory.create(&config).await.unwrap();

        cache
            .set("test", &"value", Duration::from_secs(60))
            .await
            .unwrap();

        let result: Option<String> = cache.get("test").await.unwrap();
        assert_eq!(result, Some("value".to_string()));
    }

    #[tokio::test]
    async fn test_factory_create_disk() {
        let dir = tempfile::tempdir().unwrap();
        let factory = CacheFactory::new();

        let cache = factory
            .create(&CacheConfig::disk(dir.path()))
            .await
            .unwrap();

        cache.set("test", &1, Duration::ZERO).await.unwrap();
        assert!(cache.exists("test").await.unwrap());
    }

    #[tokio::test]
    async fn test_factory_create_redis_missing_url() {
        let factory = CacheFactory::new();
        let config = CacheConfig {
            cache_type: CacheType::Redis,
            redis_url: None,
            ..Default::default()
        };

        let result = factory.create(&config).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_factory_create_disk_missing_path() {
        let factory = CacheFactory::new();
        let config = CacheConfig {
            cache_type: CacheType::Disk,
            ..Default::default()
        };

        let result = factory.create(&config).await;
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[test]
    fn test_cache_config_from_lookup() {
        let vars: std::collections::HashMap<&str, &str> = [
            ("CACHE_TYPE", "disk"),
            ("CACHE_DISK_PATH", "/tmp/pmp-cache"),
            ("CACHE_MAX_CAPACITY", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = CacheConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(config.cache_type, CacheType::Disk);
        assert_eq!(config.disk_path, Some(PathBuf::from("/tmp/pmp-cache")));
        assert_eq!(config.max_capacity, None);
        assert_eq!(config.redis_url, None);
    }

    #[test]
    fn test_cache_config_from_lookup_defaults_and_rejects() {
        let config = CacheConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.cache_type, CacheType::InMemory);

        let result = CacheConfig::from_lookup(|name| {
            (name == "CACHE_TYPE").then(|| "bogus".to_string())
        });
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }

    #[test]
    fn test_cache_type_display() {
        assert_eq!(CacheType::InMemory.to_string(), "in_memory");
        assert_eq!(CacheType::Redis.to_string(), "redis");
        assert_eq!(CacheType::Disk.to_string(), "disk");
    }
}
