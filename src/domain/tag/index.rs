//! Tag index manager
//!
//! Each tag's member keys live inside the backend itself, under the key
//! returned by [`Tag::index_key`]. Every read-modify-write of a member list
//! runs under one per-instance lock: two writers tagging different keys with
//! the same tag would otherwise both read the old list and the last write
//! would drop the other's key. The lock is shared by all tags of an instance,
//! so unrelated tags also queue behind each other.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::domain::cache::Cache;
use crate::domain::DomainError;

use super::key::Tag;
use super::members::TagMembers;

/// Maintains tag -> member key membership on top of a [`Cache`] backend
#[derive(Debug)]
pub struct TagIndex {
    cache: Arc<dyn Cache>,
    prefix: String,
    lock: Mutex<()>,
    lock_timeout: Option<Duration>,
}

impl TagIndex {
    /// Creates a tag index scoped to `prefix`
    pub fn new(cache: Arc<dyn Cache>, prefix: impl Into<String>) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
            lock: Mutex::new(()),
            lock_timeout: None,
        }
    }

    /// Bounds how long a tag mutation waits for the index lock
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Returns the backend key holding `tag`'s member list
    pub fn tag_key(&self, tag: &Tag) -> String {
        tag.index_key(&self.prefix)
    }

    /// Reads the current members of `tag`; absent tags have no members
    pub async fn members(&self, tag: &Tag) -> Result<TagMembers, DomainError> {
        self.read_members(&self.tag_key(tag)).await
    }

    /// Records `key` as a member of `tag`. A missing tag is a no-op.
    pub async fn associate(&self, key: &str, tag: Option<&Tag>) -> Result<(), DomainError> {
        let Some(tag) = tag else {
            return Ok(());
        };

        let _guard = self.acquire().await?;
        self.associate_locked(key, tag).await
    }

    /// Associates `key` with `tag` and then runs `write` without releasing the lock.
    ///
    /// Untagged writes skip the lock entirely. The association is kept when
    /// `write` fails; removing a key that was never stored is harmless.
    pub async fn write_tagged<F, Fut, T>(
        &self,
        key: &str,
        tag: Option<&Tag>,
        write: F,
    ) -> Result<T, DomainError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let Some(tag) = tag else {
            return write().await;
        };

        let _guard = self.acquire().await?;
        self.associate_locked(key, tag).await?;
        write().await
    }

    /// Deletes every key that is a member of `tag`, then the tag index entry.
    ///
    /// Returns the number of member keys that were removed. Members are the
    /// ones recorded at read time: a key retagged elsewhere meanwhile is still
    /// deleted. The index entry goes last so an interrupted run can be retried.
    /// A corrupt index fails with [`DomainError::Decode`] and is left untouched.
    pub async fn remove_by_tag(&self, tag: &Tag) -> Result<usize, DomainError> {
        let _guard = self.acquire().await?;
        let tag_key = self.tag_key(tag);

        let members = self.read_members(&tag_key).await.inspect_err(|e| {
            if e.is_decode() {
                warn!(tag = %tag, tag_key = %tag_key, error = %e, "Tag index is corrupt, nothing removed");
            }
        })?;

        let count = members.len();

        if !members.is_empty() {
            self.cache.remove_many(members.keys()).await?;
        }

        self.cache.delete(&tag_key).await?;

        debug!(tag = %tag, removed = count, "Removed tagged entries");
        Ok(count)
    }

    /// Applies [`remove_by_tag`](Self::remove_by_tag) to each tag in order
    pub async fn remove_by_tags(&self, tags: &[Tag]) -> Result<usize, DomainError> {
        let mut total = 0;

        for tag in tags {
            total += self.remove_by_tag(tag).await?;
        }

        Ok(total)
    }

    async fn acquire(&self) -> Result<MutexGuard<'_, ()>, DomainError> {
        match self.lock_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.lock.lock())
                .await
                .map_err(|_| {
                    DomainError::timeout(format!(
                        "Tag index lock not acquired within {:?}",
                        timeout
                    ))
                }),
            None => Ok(self.lock.lock().await),
        }
    }

    async fn associate_locked(&self, key: &str, tag: &Tag) -> Result<(), DomainError> {
        let tag_key = self.tag_key(tag);
        let members = self.read_members(&tag_key).await?.with_member(key);

        self.cache
            .set_raw(&tag_key, &members.encode()?, Duration::ZERO)
            .await?;

        debug!(key = %key, tag = %tag, members = members.len(), "Associated key with tag");
        Ok(())
    }

    async fn read_members(&self, tag_key: &str) -> Result<TagMembers, DomainError> {
        match self.cache.get_raw(tag_key).await? {
            Some(raw) => TagMembers::decode(&raw),
            None => Ok(TagMembers::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cache::{CacheExt, EntryTtl, MockCache};

    fn index_over(cache: Arc<MockCache>) -> TagIndex {
        TagIndex::new(cache, "test")
    }

    #[tokio::test]
    async fn test_membership_round_trip() {
        let index = index_over(Arc::new(MockCache::new()));
        let tag = Tag::from("T");

        index.associate("k1", Some(&tag)).await.unwrap();
        index.associate("k2", Some(&tag)).await.unwrap();

        let members = index.members(&tag).await.unwrap();
        assert_eq!(members.len(), 2);
        assert!(members.contains("k1"));
        assert!(members.contains("k2"));
    }

    #[tokio::test]
    async fn test_retagging_is_idempotent() {
        let index = index_over(Arc::new(MockCache::new()));
        let tag = Tag::from("T");

        index.associate("k", Some(&tag)).await.unwrap();
        index.associate("k", Some(&tag)).await.unwrap();

        let members = index.members(&tag).await.unwrap();
        assert_eq!(members.keys(), &["k".to_string()]);
    }

    #[tokio::test]
    async fn test_associate_without_tag_is_noop() {
        let cache = Arc::new(MockCache::new());
        let index = index_over(cache.clone());

        index.associate("k", None).await.unwrap();

        assert_eq!(cache.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tag_index_entry_never_expires() {
        let cache = Arc::new(MockCache::new());
        let index = index_over(cache.clone());
        let tag = Tag::from("T");

        index.associate("k", Some(&tag)).await.unwrap();

        let ttl = cache.ttl(&index.tag_key(&tag)).await.unwrap();
        assert_eq!(ttl, Some(EntryTtl::Persistent));
    }

    #[tokio::test]
    async fn test_members_of_unknown_tag_is_empty() {
        let index = index_over(Arc::new(MockCache::new()));

        let members = index.members(&Tag::from("missing")).await.unwrap();
        assert!(members.is_empty());
    }

    #[tokio::test]
    async fn test_remove_by_tag_deletes_members_and_index() {
        let cache = Arc::new(MockCache::new());
        let index = index_over(cache.clone());
        let tag = Tag::from("T");

        for key in ["k1", "k2"] {
            index
                .write_tagged(key, Some(&tag), || cache.set(key, &"v", Duration::ZERO))
                .await
                .unwrap();
        }
        cache.set("other", &"v", Duration::ZERO).await.unwrap();

        let removed = index.remove_by_tag(&tag).await.unwrap();

        assert_eq!(removed, 2);
        assert!(!cache.exists("k1").await.unwrap());
        assert!(!cache.exists("k2").await.unwrap());
        assert!(!cache.exists(&index.tag_key(&tag)).await.unwrap());
        assert!(cache.exists("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_by_tag_uses_membership_at_read_time() {
        let cache = Arc::new(MockCache::new());
        let index = index_over(cache.clone());
        let t1 = Tag::from("T1");
        let t2 = Tag::from("T2");

        index
            .write_tagged("k", Some(&t1), || cache.set("k", &"v", Duration::ZERO))
            .await
            .unwrap();
        index
            .write_tagged("k", Some(&t2), || cache.set("k", &"v", Duration::ZERO))
            .await
            .unwrap();

        index.remove_by_tag(&t1).await.unwrap();

        assert!(!cache.exists("k").await.unwrap());
        // T2 still lists the key; removing it later is harmless
        assert!(index.members(&t2).await.unwrap().contains("k"));
    }

    #[tokio::test]
    async fn test_remove_by_tags_applies_each_tag() {
        let cache = Arc::new(MockCache::new());
        let index = index_over(cache.clone());
        let a = Tag::from("a");
        let b = Tag::from("b");

        index.associate("k1", Some(&a)).await.unwrap();
        index.associate("k2", Some(&b)).await.unwrap();
        cache.set("k1", &1, Duration::ZERO).await.unwrap();
        cache.set("k2", &2, Duration::ZERO).await.unwrap();

        let removed = index.remove_by_tags(&[a, b]).await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(cache.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_associate_surfaces_corrupt_index() {
        let tag = Tag::from("T");
        let tag_key = tag.index_key("test");
        let cache = Arc::new(MockCache::new().with_raw_entry(&tag_key, "not a list"));
        let index = index_over(cache);

        let error = index.associate("k", Some(&tag)).await.unwrap_err();
        assert!(error.is_decode());
    }

    #[tokio::test]
    async fn test_remove_by_tag_surfaces_corrupt_index() {
        let tag = Tag::from("T");
        let tag_key = tag.index_key("test");
        let cache = Arc::new(MockCache::new().with_raw_entry(&tag_key, "{broken"));
        cache.set("k", &"v", Duration::ZERO).await.unwrap();
        let index = index_over(cache.clone());

        let error = index.remove_by_tag(&tag).await.unwrap_err();

        assert!(error.is_decode());
        assert!(cache.exists(&tag_key).await.unwrap());
        assert!(cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_backend_errors_propagate() {
        let index = index_over(Arc::new(MockCache::new().with_error("backend down")));
        let tag = Tag::from("T");

        assert!(matches!(
            index.associate("k", Some(&tag)).await,
            Err(DomainError::Cache { .. })
        ));
        assert!(matches!(
            index.remove_by_tag(&tag).await,
            Err(DomainError::Cache { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_write_keeps_association() {
        let cache = Arc::new(MockCache::new().with_failing_key("k"));
        let index = index_over(cache.clone());
        let tag = Tag::from("T");

        let result = index
            .write_tagged("k", Some(&tag), || cache.set("k", &"v", Duration::ZERO))
            .await;

        assert!(result.is_err());
        assert!(index.members(&tag).await.unwrap().contains("k"));
    }

    #[tokio::test]
    async fn test_untagged_write_creates_no_index_entry() {
        let cache = Arc::new(MockCache::new());
        let index = index_over(cache.clone());

        index
            .write_tagged("k", None, || cache.set("k", &"v", Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(cache.keys().await.unwrap(), vec!["k".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_tagging_loses_no_members() {
        let cache = Arc::new(MockCache::new());
        let index = Arc::new(index_over(cache));
        let tag = Tag::from("shared");

        let tasks: Vec<_> = (0..50)
            .map(|i| {
                let index = index.clone();
                let tag = tag.clone();
                tokio::spawn(async move {
                    index
                        .associate(&format!("key-{}", i), Some(&tag))
                        .await
                        .unwrap();
                })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }

        let members = index.members(&tag).await.unwrap();
        assert_eq!(members.len(), 50);
        for i in 0..50 {
            assert!(members.contains(&format!("key-{}", i)));
        }
    }

    #[tokio::test]
    async fn test_lock_timeout() {
        let index = index_over(Arc::new(MockCache::new()))
            .with_lock_timeout(Duration::from_millis(20));
        let tag = Tag::from("T");

        let _held = index.acquire().await.unwrap();

        let error = index.associate("k", Some(&tag)).await.unwrap_err();
        assert!(matches!(error, DomainError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_association_leaves_index_untouched() {
        let index = Arc::new(index_over(Arc::new(MockCache::new())));
        let tag = Tag::from("T");

        let held = index.acquire().await.unwrap();

        let task = {
            let index = index.clone();
            let tag = tag.clone();
            tokio::spawn(async move { index.associate("k", Some(&tag)).await })
        };
        tokio::task::yield_now().await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        drop(held);

        assert!(index.members(&tag).await.unwrap().is_empty());
    }
}
