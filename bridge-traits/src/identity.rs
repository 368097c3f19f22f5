//! Identity Provider Abstraction
//!
//! The host owns the interactive part of sign-in (popup, redirect, native
//! account picker). The core only needs the resulting identity claims.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Claims returned by a successful interactive sign-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Stable user identifier, used as the storage namespace
    pub uid: String,
    /// Human-readable name, if the provider shares one
    pub display_name: Option<String>,
}

/// Identity provider trait
///
/// - Web: Firebase Auth `signInWithPopup` with a Google provider
/// - Desktop: OAuth loopback flow, or a fixed local identity
///
/// # Cancellation
///
/// When the user dismisses the prompt, `authenticate` must return
/// `BridgeError::Cancelled` so the caller can leave its session untouched.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Run the interactive sign-in flow
    async fn authenticate(&self) -> Result<IdentityClaims>;

    /// End the provider-side session
    async fn sign_out(&self) -> Result<()>;
}
