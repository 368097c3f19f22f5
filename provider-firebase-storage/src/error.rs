//! Firebase Storage error types

use thiserror::Error;

/// Firebase Storage specific errors
#[derive(Error, Debug)]
pub enum FirebaseStorageError {
    /// The ID token was missing, expired or rejected
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Storage security rules denied the request
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// API returned an error response
    #[error("Firebase Storage API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Object does not exist
    #[error("Object not found: {object}")]
    ObjectNotFound { object: String },

    /// Object exists but has no download token to build a URL from
    #[error("Object has no download token: {object}")]
    MissingDownloadToken { object: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Bridge error
    #[error("Bridge error: {0}")]
    BridgeError(#[from] bridge_traits::error::BridgeError),
}

pub type Result<T> = std::result::Result<T, FirebaseStorageError>;

impl FirebaseStorageError {
    /// Classify a non-2xx response
    pub fn from_status(status_code: u16, object: &str, body: String) -> Self {
        match status_code {
            401 => FirebaseStorageError::AuthenticationFailed(body),
            403 => FirebaseStorageError::PermissionDenied(body),
            404 => FirebaseStorageError::ObjectNotFound {
                object: object.to_string(),
            },
            _ => FirebaseStorageError::ApiError {
                status_code,
                message: body,
            },
        }
    }
}

impl From<FirebaseStorageError> for bridge_traits::error::BridgeError {
    fn from(error: FirebaseStorageError) -> Self {
        use bridge_traits::error::BridgeError;

        match error {
            FirebaseStorageError::ObjectNotFound { object } => BridgeError::NotFound(object),
            FirebaseStorageError::BridgeError(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}
