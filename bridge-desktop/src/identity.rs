//! Identity Provider for single-user desktop installs
//!
//! There is no interactive prompt on desktop: the signed-in identity is the
//! OS account, or whatever the host configured.

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    identity::{IdentityClaims, IdentityProvider},
};
use tracing::debug;

/// Fallback uid when the OS user cannot be determined
const FALLBACK_UID: &str = "local";

#[derive(Debug, Clone)]
pub struct LocalIdentityProvider {
    uid: String,
    display_name: Option<String>,
}

impl LocalIdentityProvider {
    pub fn new(uid: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name,
        }
    }

    /// Identity of the current OS user (`USER`, then `USERNAME`).
    ///
    /// Characters that cannot appear in a key segment are replaced with `_`.
    pub fn from_env() -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok()
            .filter(|user| !user.trim().is_empty());

        match user {
            Some(user) => Self::new(sanitize_uid(&user), Some(user)),
            None => Self::new(FALLBACK_UID, None),
        }
    }
}

fn sanitize_uid(raw: &str) -> String {
    let uid: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if uid.chars().all(|c| c == '.') {
        FALLBACK_UID.to_string()
    } else {
        uid
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn authenticate(&self) -> Result<IdentityClaims> {
        debug!(uid = %self.uid, "Signing in local user");
        Ok(IdentityClaims {
            uid: self.uid.clone(),
            display_name: self.display_name.clone(),
        })
    }

    async fn sign_out(&self) -> Result<()> {
        Ok(())
    }
}
