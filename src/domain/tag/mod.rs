//! Tag domain - Grouping cache keys for bulk invalidation

mod index;
mod key;
mod members;

pub use index::TagIndex;
pub use key::Tag;
pub use members::TagMembers;
