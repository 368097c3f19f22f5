//! Object Store Implementation on the local file system
//!
//! Objects are plain files under a root directory; the object key is the
//! relative path. Writes go to a staging file first and are renamed into
//! place, so a listing never shows a half-written object.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{ObjectEntry, ObjectHandle, ObjectStore, ProgressSender, TransferProgress},
};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

/// Bytes written between two progress observations
const WRITE_CHUNK_SIZE: usize = 64 * 1024;

/// Directory under the root holding in-progress writes
const STAGING_DIR: &str = ".staging";

/// A staging file that is removed on drop unless it was moved into place.
///
/// Covers puts whose future is dropped mid-write (cancelled batches) as well
/// as failed writes.
struct StagingFile {
    path: PathBuf,
    persisted: bool,
}

impl StagingFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            persisted: false,
        }
    }

    async fn persist(mut self, target: &Path) -> std::io::Result<()> {
        fs::rename(&self.path, target).await?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed staging file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, "Could not remove staging file"),
        }
    }
}

/// Local directory object store
///
/// Download URLs are `file://` URLs of the stored files.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Create a store rooted at `root`. Directories are created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `{data_dir}/file-vault`, when the platform has a data directory
    pub fn default_root() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("file-vault"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key onto a path under the root.
    ///
    /// Keys are `/`-separated relative paths; empty, `.` and `..` segments,
    /// backslashes and NUL are rejected, as is the staging directory.
    fn key_to_path(&self, key: &str) -> Result<PathBuf> {
        let invalid = |reason: &str| BridgeError::InvalidKey(format!("{}: {}", key, reason));

        if key.is_empty() {
            return Err(invalid("empty key"));
        }
        if key.contains('\\') || key.contains('\0') {
            return Err(invalid("contains a forbidden character"));
        }

        let mut path = self.root.clone();
        for (index, segment) in key.split('/').enumerate() {
            match segment {
                "" | "." | ".." => return Err(invalid("contains an empty or relative segment")),
                STAGING_DIR if index == 0 => return Err(invalid("reserved prefix")),
                segment => path.push(segment),
            }
        }
        Ok(path)
    }

    fn staging_path(&self) -> PathBuf {
        self.root
            .join(STAGING_DIR)
            .join(Uuid::new_v4().to_string())
    }

    async fn write_staged(
        &self,
        staging: &Path,
        data: &Bytes,
        progress: &ProgressSender,
    ) -> std::io::Result<()> {
        let total = data.len() as u64;
        let mut file = fs::File::create(staging).await?;
        let _ = progress.send(TransferProgress::new(0, total));

        let mut written = 0u64;
        for chunk in data.chunks(WRITE_CHUNK_SIZE) {
            file.write_all(chunk).await?;
            written += chunk.len() as u64;
            let _ = progress.send(TransferProgress::new(written, total));
        }

        file.sync_all().await
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    #[instrument(skip(self, data, progress), fields(size = data.len()))]
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
        progress: ProgressSender,
    ) -> Result<ObjectHandle> {
        let path = self.key_to_path(key)?;
        let staging = StagingFile::new(self.staging_path());

        if let Some(parent) = staging.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let stored = match self.write_staged(&staging.path, &data, &progress).await {
            Ok(()) => staging.persist(&path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            return Err(BridgeError::OperationFailed(format!(
                "Failed to write {}: {}",
                key, e
            )));
        }

        info!(path = %path.display(), "Stored object");
        Ok(ObjectHandle::new(key))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let path = self.key_to_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted object");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BridgeError::NotFound(key.to_string())),
            Err(e) => Err(BridgeError::Io(e)),
        }
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        let dir_key = prefix.trim_end_matches('/');
        let dir = self.key_to_path(dir_key)?;

        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BridgeError::Io(e)),
        };

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %entry.path().display(), "Skipping non UTF-8 file name");
                continue;
            };
            entries.push(ObjectEntry {
                handle: ObjectHandle::new(format!("{}/{}", dir_key, name)),
                name,
                size: Some(metadata.len()),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn resolve_download_url(&self, handle: &ObjectHandle) -> Result<String> {
        let path = self.key_to_path(&handle.key)?;
        let absolute = match fs::canonicalize(&path).await {
            Ok(absolute) => absolute,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(BridgeError::NotFound(handle.key.clone()))
            }
            Err(e) => return Err(BridgeError::Io(e)),
        };

        Url::from_file_path(&absolute)
            .map(String::from)
            .map_err(|_| {
                BridgeError::OperationFailed(format!(
                    "Cannot build a file URL for {}",
                    absolute.display()
                ))
            })
    }
}
