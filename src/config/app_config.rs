use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::DomainError;
use crate::infrastructure::cache::{CacheConfig, CacheType};
use crate::infrastructure::services::TaggedCacheConfig;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Backend selection and tag index settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// `memory`, `redis` or `disk`
    pub backend: String,
    /// Prefix of the tag index keys
    pub prefix: String,
    pub redis_url: Option<String>,
    pub disk_path: Option<PathBuf>,
    /// Namespace applied to every Redis key
    pub key_prefix: Option<String>,
    pub max_capacity: Option<u64>,
    pub lock_timeout_ms: Option<u64>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            prefix: "pmp".to_string(),
            redis_url: None,
            disk_path: None,
            key_prefix: None,
            max_capacity: None,
            lock_timeout_ms: None,
        }
    }
}

impl CacheSettings {
    /// Builds the backend factory config
    pub fn to_cache_config(&self) -> Result<CacheConfig, DomainError> {
        let cache_type: CacheType = self.backend.parse()?;

        Ok(CacheConfig {
            cache_type,
            redis_url: self.redis_url.clone(),
            disk_path: self.disk_path.clone(),
            key_prefix: self.key_prefix.clone(),
            max_capacity: self.max_capacity,
            time_to_idle: None,
        })
    }

    /// Builds the tag layer config
    pub fn to_tagged_config(&self) -> TaggedCacheConfig {
        let config = TaggedCacheConfig::default().with_prefix(self.prefix.clone());

        match self.lock_timeout_ms {
            Some(ms) => config.with_lock_timeout(Duration::from_millis(ms)),
            None => config,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.cache.backend, "memory");
        assert_eq!(config.cache.prefix, "pmp");
    }

    #[test]
    fn test_deserialize_partial_cache_section() {
        let config: AppConfig = config::Config::builder()
            .set_override("cache.backend", "disk")
            .unwrap()
            .set_override("cache.disk_path", "/tmp/cache")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.cache.backend, "disk");
        assert_eq!(config.cache.prefix, "pmp");
        assert_eq!(config.logging.level, "info");

        let cache_config = config.cache.to_cache_config().unwrap();
        assert_eq!(cache_config.cache_type, CacheType::Disk);
        assert_eq!(cache_config.disk_path, Some(PathBuf::from("/tmp/cache")));
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let settings = CacheSettings {
            backend: "memcached".to_string(),
            ..Default::default()
        };

        assert!(matches!(
            settings.to_cache_config(),
            Err(DomainError::Configuration { .. })
        ));
    }

    #[test]
    fn test_to_tagged_config() {
        let settings = CacheSettings {
            prefix: "app".to_string(),
            lock_timeout_ms: Some(250),
            ..Default::default()
        };

        let tagged = settings.to_tagged_config();
        assert_eq!(tagged.prefix, "app");
        assert_eq!(tagged.lock_timeout, Some(Duration::from_millis(250)));
    }
}
