//! # Authentication Manager
//!
//! Tracks the signed-in user and drives the host's identity provider.
//!
//! ## Overview
//!
//! - `sign_in` runs the provider's interactive flow once at a time. A dismissed
//!   prompt leaves the session exactly as it was.
//! - `sign_out` ends the provider session and clears the local one.
//! - `current_user` / `require_user` expose the session to upload and listing
//!   code, which namespace every object key by the user's id.
//!
//! Every transition is published on the [`EventBus`].
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::AuthManager;
//! use core_runtime::events::EventBus;
//! use std::sync::Arc;
//! # use bridge_traits::{IdentityClaims, IdentityProvider, error::Result as BridgeResult};
//! # struct Popup;
//! # #[async_trait::async_trait]
//! # impl IdentityProvider for Popup {
//! #     async fn authenticate(&self) -> BridgeResult<IdentityClaims> { todo!() }
//! #     async fn sign_out(&self) -> BridgeResult<()> { Ok(()) }
//! # }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = AuthManager::new(Arc::new(Popup), EventBus::new(100));
//! let user = manager.sign_in().await?;
//! println!("Welcome, {}", user.display_label());
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{AuthState, UserId, UserIdentity};
use bridge_traits::{BridgeError, IdentityProvider};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};

/// Session manager wrapping an [`IdentityProvider`].
pub struct AuthManager {
    provider: Arc<dyn IdentityProvider>,
    event_bus: EventBus,
    session: RwLock<Option<UserIdentity>>,
    signing_in: AtomicBool,
}

/// Clears the in-progress flag when the sign-in future completes or is dropped.
struct SignInGuard<'a>(&'a AtomicBool);

impl Drop for SignInGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AuthManager {
    pub fn new(provider: Arc<dyn IdentityProvider>, event_bus: EventBus) -> Self {
        Self {
            provider,
            event_bus,
            session: RwLock::new(None),
            signing_in: AtomicBool::new(false),
        }
    }

    /// Runs the interactive sign-in flow and records the resulting identity.
    ///
    /// Signing in while already signed in replaces the session with the
    /// newly authenticated user.
    ///
    /// # Errors
    ///
    /// - `AuthError::SignInInProgress` - another sign-in has not finished
    /// - `AuthError::Dismissed` - the user closed the prompt; no state change
    /// - `AuthError::AuthenticationFailed` - the provider reported a failure
    /// - `AuthError::InvalidIdentity` - the provider returned an unusable uid
    #[instrument(skip(self))]
    pub async fn sign_in(&self) -> Result<UserIdentity> {
        if self
            .signing_in
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Sign-in already in progress");
            return Err(AuthError::SignInInProgress);
        }
        let _guard = SignInGuard(&self.signing_in);

        info!("Starting interactive sign-in");

        let claims = match self.provider.authenticate().await {
            Ok(claims) => claims,
            Err(BridgeError::Cancelled) => {
                info!("Sign-in prompt dismissed");
                self.emit(AuthEvent::SignInDismissed);
                return Err(AuthError::Dismissed);
            }
            Err(e) => {
                error!(error = %e, "Identity provider failed");
                self.emit(AuthEvent::AuthError {
                    message: e.to_string(),
                });
                return Err(AuthError::AuthenticationFailed(e.to_string()));
            }
        };

        let uid = UserId::parse(claims.uid).map_err(|e| {
            error!(error = %e, "Identity provider returned an invalid uid");
            self.emit(AuthEvent::AuthError {
                message: e.to_string(),
            });
            e
        })?;

        let identity = UserIdentity {
            uid,
            display_name: claims.display_name,
        };

        *self.session.write().await = Some(identity.clone());

        self.emit(AuthEvent::SignedIn {
            uid: identity.uid.to_string(),
            display_name: identity.display_name.clone(),
        });
        info!(uid = %identity.uid, "Sign-in completed");

        Ok(identity)
    }

    /// Ends the session.
    ///
    /// Signing out with no active session still asks the provider to end its
    /// side and succeeds. If the provider fails, the local session is kept.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        if let Err(e) = self.provider.sign_out().await {
            error!(error = %e, "Provider sign-out failed");
            self.emit(AuthEvent::AuthError {
                message: e.to_string(),
            });
            return Err(AuthError::SignOutFailed(e.to_string()));
        }

        let previous = self.session.write().await.take();
        if let Some(identity) = previous {
            self.emit(AuthEvent::SignedOut {
                uid: identity.uid.to_string(),
            });
            info!(uid = %identity.uid, "Signed out");
        }

        Ok(())
    }

    pub async fn current_user(&self) -> Option<UserIdentity> {
        self.session.read().await.clone()
    }

    /// Like [`current_user`](Self::current_user), but an error when signed out.
    pub async fn require_user(&self) -> Result<UserIdentity> {
        self.current_user().await.ok_or(AuthError::NotAuthenticated)
    }

    pub async fn state(&self) -> AuthState {
        if self.signing_in.load(Ordering::Acquire) {
            return AuthState::SigningIn;
        }
        if self.session.read().await.is_some() {
            AuthState::SignedIn
        } else {
            AuthState::SignedOut
        }
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.event_bus.emit(CoreEvent::Auth(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::IdentityClaims;
    use mockall::mock;
    use std::time::Duration;
    use tokio::sync::Notify;

    mock! {
        Identity {}

        #[async_trait]
        impl IdentityProvider for Identity {
            async fn authenticate(&self) -> BridgeResult<IdentityClaims>;
            async fn sign_out(&self) -> BridgeResult<()>;
        }
    }

    fn claims(uid: &str) -> IdentityClaims {
        IdentityClaims {
            uid: uid.to_string(),
            display_name: Some("Ada".to_string()),
        }
    }

    #[tokio::test]
    async fn test_sign_in_records_session_and_emits() {
        let mut provider = MockIdentity::new();
        provider
            .expect_authenticate()
            .times(1)
            .returning(|| Ok(claims("uid-1")));

        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let manager = AuthManager::new(Arc::new(provider), bus);

        let identity = manager.sign_in().await.unwrap();
        assert_eq!(identity.uid.as_str(), "uid-1");
        assert_eq!(manager.state().await, AuthState::SignedIn);
        assert_eq!(manager.current_user().await, Some(identity));

        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::SignedIn {
                uid: "uid-1".to_string(),
                display_name: Some("Ada".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn test_dismissed_prompt_keeps_previous_session() {
        let mut provider = MockIdentity::new();
        let mut calls = 0;
        provider.expect_authenticate().times(2).returning(move || {
            calls += 1;
            if calls == 1 {
                Ok(claims("uid-1"))
            } else {
                Err(BridgeError::Cancelled)
            }
        });

        let manager = AuthManager::new(Arc::new(provider), EventBus::new(16));
        manager.sign_in().await.unwrap();

        let result = manager.sign_in().await;
        assert!(matches!(result, Err(AuthError::Dismissed)));
        assert_eq!(
            manager.current_user().await.map(|u| u.uid.to_string()),
            Some("uid-1".to_string())
        );
    }

    #[tokio::test]
    async fn test_dismissed_prompt_while_signed_out() {
        let mut provider = MockIdentity::new();
        provider
            .expect_authenticate()
            .returning(|| Err(BridgeError::Cancelled));

        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let manager = AuthManager::new(Arc::new(provider), bus);

        assert!(matches!(manager.sign_in().await, Err(AuthError::Dismissed)));
        assert_eq!(manager.state().await, AuthState::SignedOut);
        assert!(matches!(
            manager.require_user().await,
            Err(AuthError::NotAuthenticated)
        ));
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::SignInDismissed)
        );
    }

    #[tokio::test]
    async fn test_provider_failure_is_authentication_failed() {
        let mut provider = MockIdentity::new();
        provider
            .expect_authenticate()
            .returning(|| Err(BridgeError::OperationFailed("popup blocked".to_string())));

        let manager = AuthManager::new(Arc::new(provider), EventBus::new(16));
        match manager.sign_in().await {
            Err(AuthError::AuthenticationFailed(message)) => {
                assert!(message.contains("popup blocked"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(manager.current_user().await.is_none());
    }

    #[tokio::test]
    async fn test_unsafe_uid_is_rejected() {
        let mut provider = MockIdentity::new();
        provider
            .expect_authenticate()
            .returning(|| Ok(claims("../admin")));

        let manager = AuthManager::new(Arc::new(provider), EventBus::new(16));
        assert!(matches!(
            manager.sign_in().await,
            Err(AuthError::InvalidIdentity { .. })
        ));
        assert!(manager.current_user().await.is_none());
    }

    struct SlowProvider {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl IdentityProvider for SlowProvider {
        async fn authenticate(&self) -> BridgeResult<IdentityClaims> {
            self.release.notified().await;
            Ok(claims("uid-1"))
        }

        async fn sign_out(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_concurrent_sign_in_prevented() {
        let release = Arc::new(Notify::new());
        let manager = Arc::new(AuthManager::new(
            Arc::new(SlowProvider {
                release: release.clone(),
            }),
            EventBus::new(16),
        ));

        let first = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.sign_in().await })
        };

        while manager.state().await != AuthState::SigningIn {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        assert!(matches!(
            manager.sign_in().await,
            Err(AuthError::SignInInProgress)
        ));

        release.notify_one();
        assert!(first.await.unwrap().is_ok());
        assert_eq!(manager.state().await, AuthState::SignedIn);
    }

    #[tokio::test]
    async fn test_sign_out_clears_session() {
        let mut provider = MockIdentity::new();
        provider
            .expect_authenticate()
            .returning(|| Ok(claims("uid-1")));
        provider.expect_sign_out().times(1).returning(|| Ok(()));

        let bus = EventBus::new(16);
        let manager = AuthManager::new(Arc::new(provider), bus.clone());
        manager.sign_in().await.unwrap();

        let mut events = bus.subscribe();
        manager.sign_out().await.unwrap();

        assert!(manager.current_user().await.is_none());
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::SignedOut {
                uid: "uid-1".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_failed_sign_out_keeps_session() {
        let mut provider = MockIdentity::new();
        provider
            .expect_authenticate()
            .returning(|| Ok(claims("uid-1")));
        provider
            .expect_sign_out()
            .returning(|| Err(BridgeError::OperationFailed("offline".to_string())));

        let manager = AuthManager::new(Arc::new(provider), EventBus::new(16));
        manager.sign_in().await.unwrap();

        assert!(matches!(
            manager.sign_out().await,
            Err(AuthError::SignOutFailed(_))
        ));
        assert!(manager.current_user().await.is_some());
    }

    #[tokio::test]
    async fn test_sign_out_without_session_emits_nothing() {
        let mut provider = MockIdentity::new();
        provider.expect_sign_out().returning(|| Ok(()));

        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let manager = AuthManager::new(Arc::new(provider), bus);

        manager.sign_out().await.unwrap();
        assert!(matches!(
            events.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }
}
