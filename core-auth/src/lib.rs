//! # Authentication Module
//!
//! Session tracking on top of a host-provided identity provider.
//!
//! ## Overview
//!
//! The interactive part of sign-in (popup, account picker) belongs to the
//! host and is reached through [`bridge_traits::IdentityProvider`]. This crate
//! keeps the resulting identity, guards against overlapping sign-in attempts,
//! and emits auth events on the core event bus.
//!
//! The signed-in user's id is the storage namespace for every object key, so
//! identities are validated before they are accepted.

pub mod error;
pub mod manager;
pub mod types;

pub use error::{AuthError, Result};
pub use manager::AuthManager;
pub use types::{AuthState, UserId, UserIdentity};
