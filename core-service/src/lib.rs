//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (object store,
//! identity provider, clock) into the shared Rust core and exposes a single
//! [`FileManager`] to the host. Desktop apps typically enable the
//! `desktop-shims` feature (which depends on `bridge-desktop`), whereas web
//! hosts enable `firebase` and inject a [`FirebaseStorageConnector`] over
//! their own `HttpClient`.

pub mod error;
pub mod manager;

pub use error::{CoreError, Result};
pub use manager::{FileManager, SelectionReport, UploadStart};

pub use core_auth::{AuthState, UserId, UserIdentity};
pub use core_runtime::config::{CoreConfig, CoreConfigBuilder, UploadPolicy};
pub use core_runtime::events::{CoreEvent, EventBus, EventStream};
pub use core_upload::{
    BatchReport, BatchStatus, Conflict, ConflictResolution, DeleteReport, FileOutcome,
    PendingFile, PreviewKind, Rejection, RemoteFile, UploadHandle, UploadProgress,
};

#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub use bridge_desktop::{LocalIdentityProvider, LocalObjectStore, ReqwestHttpClient};

#[cfg(feature = "firebase")]
pub use provider_firebase_storage::FirebaseStorageConnector;

#[cfg(feature = "firebase")]
use std::sync::Arc;

/// Convenience bootstrapper for desktop hosts.
///
/// Files are stored under `storage_root`, or the platform data directory
/// when `None`; the signed-in user is the OS account.
///
/// ```no_run
/// # #[cfg(feature = "desktop-shims")]
/// # fn example() -> core_service::Result<()> {
/// let manager = core_service::bootstrap_desktop(None)?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop(storage_root: Option<std::path::PathBuf>) -> Result<FileManager> {
    let mut builder = CoreConfig::builder();
    if let Some(root) = storage_root {
        builder = builder.storage_root(root);
    }
    let config = builder
        .build()
        .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;
    Ok(FileManager::new(config))
}

/// Convenience bootstrapper for Firebase Storage.
///
/// `id_token` is the Firebase ID token of the user the host's sign-in popup
/// returned; `identity_provider` must report that same user.
#[cfg(feature = "firebase")]
pub fn bootstrap_firebase(
    http_client: Arc<dyn bridge_traits::http::HttpClient>,
    identity_provider: Arc<dyn bridge_traits::IdentityProvider>,
    bucket: impl Into<String>,
    id_token: impl Into<String>,
) -> Result<FileManager> {
    let store = FirebaseStorageConnector::new(http_client, bucket, id_token);
    let config = CoreConfig::builder()
        .object_store(Arc::new(store))
        .identity_provider(identity_provider)
        .build()?;
    Ok(FileManager::new(config))
}
