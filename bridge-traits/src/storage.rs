//! Object Store Abstractions
//!
//! Provides the platform-agnostic trait the core uses to talk to a
//! path-addressable blob store (Firebase Storage, a local directory, S3, ...).
//!
//! Every key the core hands to an implementation already carries the per-user
//! namespace (`uploads/{uid}/{file_name}`); implementations treat keys as opaque
//! and must not rewrite them.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// A single progress observation for one in-flight put.
///
/// For a given put, `bytes_transferred` is non-decreasing across observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

impl TransferProgress {
    pub fn new(bytes_transferred: u64, total_bytes: u64) -> Self {
        Self {
            bytes_transferred: bytes_transferred.min(total_bytes),
            total_bytes,
        }
    }

    /// Whether every byte of the object has been transferred
    pub fn is_complete(&self) -> bool {
        self.bytes_transferred >= self.total_bytes
    }
}

/// Channel on which an implementation reports put progress.
///
/// Implementations drop the sender when the put finishes; receivers treat a
/// closed channel as the end of the progress sequence. Send failures (receiver
/// gone) must be ignored.
pub type ProgressSender = mpsc::UnboundedSender<TransferProgress>;

/// Retrieval handle for a stored object.
///
/// `download_token` is store specific (e.g. Firebase `downloadTokens`); stores
/// that build URLs from the key alone leave it empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectHandle {
    /// Full object key, including the namespace prefix
    pub key: String,
    /// Optional store-issued token required to build a download URL
    pub download_token: Option<String>,
}

impl ObjectHandle {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            download_token: None,
        }
    }

    pub fn with_download_token(mut self, token: impl Into<String>) -> Self {
        self.download_token = Some(token.into());
        self
    }

    /// Final path segment of the key (the user-visible file name)
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// One entry returned by [`ObjectStore::list_objects`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    /// File name relative to the listed prefix
    pub name: String,
    /// Handle used to resolve a download URL
    pub handle: ObjectHandle,
    /// Object size in bytes, when the store reports it
    pub size: Option<u64>,
}

/// Object store trait
///
/// Abstracts the blob storage service backing a user's files:
/// - Web: Firebase Storage via REST or the JS SDK
/// - Desktop: a local directory (`bridge-desktop::LocalObjectStore`)
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::ObjectStore;
/// use tokio::sync::mpsc;
///
/// async fn store(store: &dyn ObjectStore, data: bytes::Bytes) -> Result<()> {
///     let (tx, mut rx) = mpsc::unbounded_channel();
///     let handle = store
///         .put_object("uploads/uid-1/cat.png", data, Some("image/png"), tx)
///         .await?;
///     while let Some(progress) = rx.recv().await {
///         println!("{}/{}", progress.bytes_transferred, progress.total_bytes);
///     }
///     let url = store.resolve_download_url(&handle).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, overwriting any existing object.
    ///
    /// Progress is reported on `progress`; the sender is dropped when the put
    /// completes, successfully or not.
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
        progress: ProgressSender,
    ) -> Result<ObjectHandle>;

    /// Delete the object stored under `key`
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::NotFound` when nothing is stored under `key`.
    async fn delete_object(&self, key: &str) -> Result<()>;

    /// List objects directly under `prefix` (non-recursive)
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectEntry>>;

    /// Turn a handle into a URL a browser or HTTP client can fetch
    async fn resolve_download_url(&self, handle: &ObjectHandle) -> Result<String>;
}
