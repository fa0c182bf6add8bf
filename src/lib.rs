//! PMP Tag Cache
//!
//! A cache facade that files keys under tags so whole groups can be
//! invalidated at once. Supports:
//! - In-memory (moka), Redis and disk backends behind one `Cache` trait
//! - Tag indexes stored in the backend itself, scoped by an instance prefix
//! - Serialized index updates so concurrent tagged writes never lose members

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::{Cache, CacheExt, DomainError, EntryTtl, Tag, TagIndex, TagMembers};
pub use infrastructure::cache::{CacheConfig, CacheFactory, CacheType};
pub use infrastructure::services::{TaggedCacheConfig, TaggedCacheService};
