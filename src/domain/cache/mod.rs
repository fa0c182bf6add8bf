//! Cache domain - Backend contract shared by every store

mod repository;

pub use repository::{Cache, CacheExt, EntryTtl};
pub(crate) use repository::{decode_value, encode_value};

#[cfg(test)]
pub use repository::mock::MockCache;
