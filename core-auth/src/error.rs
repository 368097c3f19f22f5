use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Sign-in was dismissed by the user")]
    Dismissed,

    #[error("Sign-in already in progress")]
    SignInInProgress,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid user id {uid:?}: {reason}")]
    InvalidIdentity { uid: String, reason: String },

    #[error("Sign-out failed: {0}")]
    SignOutFailed(String),

    #[error("Not authenticated")]
    NotAuthenticated,
}

pub type Result<T> = std::result::Result<T, AuthError>;
