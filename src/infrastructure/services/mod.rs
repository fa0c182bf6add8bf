//! Infrastructure services

mod tagged_cache_service;

pub use tagged_cache_service::{TaggedCacheConfig, TaggedCacheService};
