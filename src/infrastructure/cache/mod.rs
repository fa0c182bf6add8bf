//! Cache infrastructure - Backend implementations

mod disk;
mod factory;
mod in_memory;
mod redis;

pub use disk::{DiskCache, DiskCacheConfig};
pub use factory::{CacheConfig, CacheFactory, CacheType};
pub use in_memory::{InMemoryCache, InMemoryCacheConfig};
pub use redis::{RedisCache, RedisCacheConfig};
