//! Firebase Storage Provider
//!
//! Implements the `ObjectStore` trait over the Firebase Storage REST API
//! (`https://firebasestorage.googleapis.com/v0`).
//!
//! # Features
//!
//! - Media uploads authenticated with a Firebase ID token
//! - Paginated, delimiter-based listing of a single "directory"
//! - Download URL resolution through the object's `downloadTokens`
//!
//! All HTTP goes through the `HttpClient` bridge, so the connector runs
//! wherever a host supplies one.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::FirebaseStorageConnector;
pub use error::{FirebaseStorageError, Result};
