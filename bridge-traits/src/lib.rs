//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the file-vault core and the
//! environment it runs in. The core never talks to a storage service or an
//! identity provider directly; it goes through these traits so the same
//! upload/conflict logic runs against Firebase Storage in a browser, a local
//! directory on desktop, or an in-memory fake in tests.
//!
//! ## Traits
//!
//! ### Storage & Identity
//! - [`ObjectStore`](storage::ObjectStore) - put/delete/list objects, resolve download URLs
//! - [`IdentityProvider`](identity::IdentityProvider) - interactive sign-in and sign-out
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP used by REST-backed stores
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate          |
//! |----------|-------------------------------|
//! | Desktop  | `bridge-desktop`              |
//! | Web      | `provider-firebase-storage`   |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should map platform failures onto it, keep messages actionable, and return
//! `BridgeError::Cancelled` only for user-initiated aborts.
//!
//! ## Thread Safety
//!
//! Storage, identity and HTTP traits require `Send + Sync` so a single handle
//! can serve every concurrent put in an upload batch.

pub mod error;
pub mod http;
pub mod identity;
pub mod platform;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use identity::{IdentityClaims, IdentityProvider};
pub use storage::{ObjectEntry, ObjectHandle, ObjectStore, ProgressSender, TransferProgress};
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
