//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `ObjectStore` on a local directory via `tokio::fs`
//! - `IdentityProvider` backed by the OS account
//! - `HttpClient` using `reqwest`, for REST-backed stores
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{LocalIdentityProvider, LocalObjectStore};
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .object_store(Arc::new(LocalObjectStore::new("/srv/file-vault")))
//!     .identity_provider(Arc::new(LocalIdentityProvider::from_env()))
//!     .build()?;
//! ```

mod http;
mod identity;
mod object_store;

pub use http::ReqwestHttpClient;
pub use identity::LocalIdentityProvider;
pub use object_store::LocalObjectStore;
