//! # Core Configuration Module
//!
//! Configuration for the file-vault core.
//!
//! ## Overview
//!
//! A builder produces a [`CoreConfig`] holding the injected bridges plus the
//! [`UploadPolicy`] that drives validation and upload concurrency. Missing
//! bridges fail fast with [`Error::CapabilityMissing`] so misconfiguration
//! surfaces at startup rather than on the first upload.
//!
//! ## Required Dependencies
//!
//! - `ObjectStore` - where user files live
//! - `IdentityProvider` - interactive sign-in
//!
//! With the `desktop-shims` feature, `LocalObjectStore` (a directory under the
//! user data dir) and `LocalIdentityProvider` (the OS user) are injected when
//! not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, UploadPolicy};
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .object_store(Arc::new(my_store))
//!     .identity_provider(Arc::new(my_identity))
//!     .max_concurrent_uploads(8)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{Clock, IdentityProvider, ObjectStore, SystemClock};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Largest accepted file, in bytes (12 MiB).
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 12_582_912;

/// Number of puts allowed in flight at once by default.
pub const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 4;

/// First segment of every object key.
pub const DEFAULT_NAMESPACE_ROOT: &str = "uploads";

/// Core configuration.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    pub object_store: Arc<dyn ObjectStore>,
    pub identity_provider: Arc<dyn IdentityProvider>,
    /// Time source for rename stamps
    pub clock: Arc<dyn Clock>,
    pub upload_policy: UploadPolicy,
    /// Per-subscriber buffer of the event bus
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("object_store", &"ObjectStore { ... }")
            .field("identity_provider", &"IdentityProvider { ... }")
            .field("clock", &"Clock { ... }")
            .field("upload_policy", &self.upload_policy)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

/// Rules applied to every file before it may be queued, plus upload limits.
///
/// The allow-list maps a lowercase extension to the MIME type a browser
/// reports for it. Several extensions may share one MIME type (`jpg`, `jpeg`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_file_size_bytes: u64,
    pub allowed_types: BTreeMap<String, String>,
    pub max_concurrent_uploads: usize,
    /// Object keys are `{namespace_root}/{uid}/{file_name}`
    pub namespace_root: String,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        let allowed_types = [
            ("jpeg", "image/jpeg"),
            ("jpg", "image/jpeg"),
            ("gif", "image/gif"),
            ("png", "image/png"),
            ("pdf", "application/pdf"),
        ]
        .into_iter()
        .map(|(ext, mime)| (ext.to_string(), mime.to_string()))
        .collect();

        Self {
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            allowed_types,
            max_concurrent_uploads: DEFAULT_MAX_CONCURRENT_UPLOADS,
            namespace_root: DEFAULT_NAMESPACE_ROOT.to_string(),
        }
    }
}

impl UploadPolicy {
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size_bytes = bytes;
        self
    }

    pub fn with_max_concurrent_uploads(mut self, limit: usize) -> Self {
        self.max_concurrent_uploads = limit;
        self
    }

    pub fn with_namespace_root(mut self, root: impl Into<String>) -> Self {
        self.namespace_root = root.into();
        self
    }

    /// Allow an additional extension, stored lowercase.
    pub fn allow(mut self, extension: &str, mime_type: &str) -> Self {
        self.allowed_types
            .insert(extension.to_ascii_lowercase(), mime_type.to_ascii_lowercase());
        self
    }

    /// MIME type expected for `extension` (case-insensitive), if allowed.
    pub fn mime_for_extension(&self, extension: &str) -> Option<&str> {
        self.allowed_types
            .get(&extension.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Sorted, comma separated list of allowed extensions, for messages.
    pub fn allowed_extensions(&self) -> String {
        self.allowed_types
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_file_size_bytes == 0 {
            return Err(Error::policy(
                "max_file_size_bytes",
                "must be greater than 0",
            ));
        }

        if self.allowed_types.is_empty() {
            return Err(Error::policy(
                "allowed_types",
                "at least one extension must be allowed",
            ));
        }

        if self.max_concurrent_uploads == 0 {
            return Err(Error::policy(
                "max_concurrent_uploads",
                "must be greater than 0",
            ));
        }

        let root = self.namespace_root.as_str();
        if root.is_empty() {
            return Err(Error::policy("namespace_root", "cannot be empty"));
        }
        if root.contains('/') || root.contains('\\') || root == "." || root == ".." {
            return Err(Error::policy(
                "namespace_root",
                format!("'{}' must be a single path segment", root),
            ));
        }

        Ok(())
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        self.upload_policy.validate()
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn object_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "ObjectStore".to_string(),
        message: "ObjectStore implementation is required to store user files. \
                 Desktop: enable the 'desktop-shims' feature to use the default LocalObjectStore. \
                 Web: inject provider-firebase-storage's FirebaseStorageConnector."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn identity_provider_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "IdentityProvider".to_string(),
        message: "IdentityProvider implementation is required for sign-in. \
                 Desktop: enable the 'desktop-shims' feature to use the default LocalIdentityProvider. \
                 Web: inject a provider backed by the host's sign-in popup."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_object_store(root: Option<PathBuf>) -> Result<Arc<dyn ObjectStore>> {
    use bridge_desktop::LocalObjectStore;

    let root = match root {
        Some(root) => root,
        None => LocalObjectStore::default_root().ok_or_else(|| Error::CapabilityMissing {
            capability: "ObjectStore".to_string(),
            message: "No user data directory found for the default LocalObjectStore. \
                     Set .storage_root() or inject an ObjectStore."
                .to_string(),
        })?,
    };

    let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(root));
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_object_store(_root: Option<PathBuf>) -> Result<Arc<dyn ObjectStore>> {
    Err(object_store_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_identity_provider() -> Result<Arc<dyn IdentityProvider>> {
    use bridge_desktop::LocalIdentityProvider;

    let provider: Arc<dyn IdentityProvider> = Arc::new(LocalIdentityProvider::from_env());
    Ok(provider)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_identity_provider() -> Result<Arc<dyn IdentityProvider>> {
    Err(identity_provider_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    object_store: Option<Arc<dyn ObjectStore>>,
    identity_provider: Option<Arc<dyn IdentityProvider>>,
    clock: Option<Arc<dyn Clock>>,
    storage_root: Option<PathBuf>,
    upload_policy: Option<UploadPolicy>,
    max_concurrent_uploads: Option<usize>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the object store (required unless `desktop-shims` is enabled).
    pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    /// Sets the identity provider (required unless `desktop-shims` is enabled).
    pub fn identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity_provider = Some(provider);
        self
    }

    /// Sets the clock used to stamp renamed uploads.
    ///
    /// Default: [`SystemClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Directory used by the default desktop object store.
    ///
    /// Ignored when an object store is injected.
    pub fn storage_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.storage_root = Some(path.into());
        self
    }

    pub fn upload_policy(mut self, policy: UploadPolicy) -> Self {
        self.upload_policy = Some(policy);
        self
    }

    /// Overrides the policy's concurrency limit.
    pub fn max_concurrent_uploads(mut self, limit: usize) -> Self {
        self.max_concurrent_uploads = Some(limit);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds and validates the final `CoreConfig`.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when a required bridge is absent and no
    ///   desktop default applies
    /// - [`Error::InvalidPolicy`] / [`Error::Config`] for invalid values
    pub fn build(self) -> Result<CoreConfig> {
        let object_store = match self.object_store {
            Some(store) => store,
            None => provide_default_object_store(self.storage_root)?,
        };

        let identity_provider = match self.identity_provider {
            Some(provider) => provider,
            None => provide_default_identity_provider()?,
        };

        let mut upload_policy = self.upload_policy.unwrap_or_default();
        if let Some(limit) = self.max_concurrent_uploads {
            upload_policy.max_concurrent_uploads = limit;
        }

        let config = CoreConfig {
            object_store,
            identity_provider,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            upload_policy,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}
