use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AuthError, Result};

/// Identifier of a signed-in user, as issued by the identity provider.
///
/// The id is used verbatim as a path segment of every object key
/// (`uploads/{uid}/...`), so it must be a single, non-traversing segment.
///
/// # Examples
///
/// ```
/// use core_auth::UserId;
///
/// let uid = UserId::parse("kV3xq9").unwrap();
/// assert_eq!(uid.as_str(), "kV3xq9");
///
/// assert!(UserId::parse("../other").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let reason = if raw.is_empty() {
            Some("cannot be empty")
        } else if raw.contains('/') || raw.contains('\\') {
            Some("cannot contain path separators")
        } else if raw == "." || raw == ".." {
            Some("cannot be a relative path segment")
        } else if raw.chars().any(char::is_control) {
            Some("cannot contain control characters")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(AuthError::InvalidIdentity {
                uid: raw,
                reason: reason.to_string(),
            }),
            None => Ok(Self(raw)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub uid: UserId,
    pub display_name: Option<String>,
}

impl UserIdentity {
    /// Name to greet the user with, falling back to the uid.
    pub fn display_label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.uid.as_str())
    }
}

/// Authentication state of the session.
///
/// ```
/// use core_auth::AuthState;
///
/// assert!(!AuthState::SignedOut.is_authenticated());
/// assert!(AuthState::SignedIn.is_authenticated());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AuthState {
    #[default]
    SignedOut,
    /// The identity provider's prompt is open
    SigningIn,
    SignedIn,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::SignedIn)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::SignedOut => write!(f, "Signed Out"),
            AuthState::SigningIn => write!(f, "Signing In..."),
            AuthState::SignedIn => write!(f, "Signed In"),
        }
    }
}
