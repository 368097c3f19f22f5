//! # Listing Cache
//!
//! The core's local view of a user's stored files, keyed by file name.
//!
//! The cache is an owned value; callers pass it to the operations that read
//! or mutate it. Entries only appear after the store confirmed them and only
//! disappear after a confirmed delete or an authoritative refresh.
//!
//! A cache is **stale** when it was patched locally after a refresh failed.
//! The next successful [`ListingCache::refresh`] clears the flag.

use bridge_traits::storage::{ObjectEntry, ObjectStore};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

use crate::error::{Result, UploadError};
use crate::types::RemoteFile;

#[derive(Debug, Clone, Default)]
pub struct ListingCache {
    entries: BTreeMap<String, RemoteFile>,
    last_refreshed: Option<DateTime<Utc>>,
    stale: bool,
}

impl ListingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cache contents with the objects stored under `prefix`.
    ///
    /// Download URLs are resolved concurrently. On any failure the previous
    /// entries are kept and the error is returned.
    ///
    /// Returns the number of entries now cached.
    #[instrument(skip(self, store, prefix), fields(prefix = %prefix))]
    pub async fn refresh(&mut self, store: &dyn ObjectStore, prefix: &str) -> Result<usize> {
        let objects = store
            .list_objects(prefix)
            .await
            .map_err(|e| UploadError::Listing {
                prefix: prefix.to_string(),
                message: e.to_string(),
            })?;

        let files = try_join_all(objects.into_iter().map(|entry| resolve(store, entry)))
            .await
            .map_err(|e| UploadError::Listing {
                prefix: prefix.to_string(),
                message: e.to_string(),
            })?;

        self.entries = files
            .into_iter()
            .map(|file| (file.name.clone(), file))
            .collect();
        self.last_refreshed = Some(Utc::now());
        self.stale = false;

        debug!(count = self.entries.len(), "Listing refreshed");
        Ok(self.entries.len())
    }

    /// Entries sorted by name.
    pub fn entries(&self) -> impl Iterator<Item = &RemoteFile> {
        self.entries.values()
    }

    pub fn to_vec(&self) -> Vec<RemoteFile> {
        self.entries.values().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&RemoteFile> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop an entry after its object was deleted.
    pub fn remove(&mut self, name: &str) -> Option<RemoteFile> {
        self.entries.remove(name)
    }

    /// Add or overwrite an entry for an object the store just confirmed.
    ///
    /// Used when an authoritative refresh is not possible; marks the cache
    /// stale.
    pub fn insert_confirmed(&mut self, file: RemoteFile) {
        if self.entries.insert(file.name.clone(), file).is_some() {
            debug!("Overwrote cached entry with confirmed upload");
        }
        self.stale = true;
    }

    pub fn mark_stale(&mut self) {
        if !self.stale {
            warn!("Listing cache marked stale");
        }
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.last_refreshed
    }

    /// Forget everything, e.g. on sign-out.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_refreshed = None;
        self.stale = false;
    }
}

async fn resolve(
    store: &dyn ObjectStore,
    entry: ObjectEntry,
) -> bridge_traits::error::Result<RemoteFile> {
    let url = store.resolve_download_url(&entry.handle).await?;
    Ok(RemoteFile {
        name: entry.name,
        url,
        size: entry.size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::storage::{ObjectHandle, ProgressSender};
    use bytes::Bytes;

    /// Lists a fixed set of names; URL lookups fail when `url_error` is set.
    struct FixedStore {
        names: Vec<&'static str>,
        list_error: Option<&'static str>,
        url_error: Option<&'static str>,
    }

    impl FixedStore {
        fn listing(names: Vec<&'static str>) -> Self {
            Self {
                names,
                list_error: None,
                url_error: None,
            }
        }
    }

    #[async_trait]
    impl ObjectStore for FixedStore {
        async fn put_object(
            &self,
            key: &str,
            _data: Bytes,
            _content_type: Option<&str>,
            _progress: ProgressSender,
        ) -> BridgeResult<ObjectHandle> {
            Ok(ObjectHandle::new(key))
        }

        async fn delete_object(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn list_objects(&self, prefix: &str) -> BridgeResult<Vec<ObjectEntry>> {
            if let Some(message) = self.list_error {
                return Err(BridgeError::NotAvailable(message.to_string()));
            }
            Ok(self
                .names
                .iter()
                .map(|name| ObjectEntry {
                    name: name.to_string(),
                    handle: ObjectHandle::new(format!("{}{}", prefix, name)),
                    size: Some(3),
                })
                .collect())
        }

        async fn resolve_download_url(&self, handle: &ObjectHandle) -> BridgeResult<String> {
            match self.url_error {
                Some(message) => Err(BridgeError::OperationFailed(message.to_string())),
                None => Ok(format!("https://files.test/{}", handle.file_name())),
            }
        }
    }

    fn remote(name: &str) -> RemoteFile {
        RemoteFile {
            name: name.to_string(),
            url: format!("https://files.test/{}", name),
            size: None,
        }
    }

    #[tokio::test]
    async fn test_refresh_resolves_urls() {
        let store = FixedStore::listing(vec!["b.pdf", "a.png"]);

        let mut cache = ListingCache::new();
        cache.mark_stale();
        let count = cache.refresh(&store, "uploads/uid-1/").await.unwrap();

        assert_eq!(count, 2);
        assert!(!cache.is_stale());
        assert!(cache.last_refreshed().is_some());
        let names: Vec<_> = cache.entries().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.png", "b.pdf"]);
        assert_eq!(cache.get("a.png").unwrap().url, "https://files.test/a.png");
        assert_eq!(cache.get("a.png").unwrap().size, Some(3));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_entries() {
        let store = FixedStore {
            url_error: Some("token expired"),
            ..FixedStore::listing(vec!["a.png"])
        };

        let mut cache = ListingCache::new();
        cache.insert_confirmed(remote("old.png"));

        let err = cache.refresh(&store, "uploads/uid-1/").await.unwrap_err();
        assert!(matches!(err, UploadError::Listing { .. }));
        assert!(cache.contains("old.png"));
        assert!(!cache.contains("a.png"));
        assert!(cache.is_stale());
    }

    #[tokio::test]
    async fn test_list_failure_is_reported() {
        let store = FixedStore {
            list_error: Some("offline"),
            ..FixedStore::listing(vec![])
        };

        let mut cache = ListingCache::new();
        let err = cache.refresh(&store, "uploads/uid-1/").await.unwrap_err();
        assert!(err.to_string().contains("offline"));
    }

    #[test]
    fn test_local_mutations() {
        let mut cache = ListingCache::new();
        cache.insert_confirmed(remote("a.png"));
        cache.insert_confirmed(remote("a.png"));
        assert_eq!(cache.len(), 1);
        assert!(cache.is_stale());

        assert!(cache.remove("a.png").is_some());
        assert!(cache.is_empty());

        cache.insert_confirmed(remote("b.png"));
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.is_stale());
    }
}
