//! Domain layer - Backend contract and tag index

pub mod cache;
pub mod error;
pub mod tag;

pub use cache::{Cache, CacheExt, EntryTtl};
pub use error::DomainError;
pub use tag::{Tag, TagIndex, TagMembers};
