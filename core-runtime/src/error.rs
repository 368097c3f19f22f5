use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Invalid upload policy: {field} - {message}")]
    InvalidPolicy { field: String, message: String },

    #[error("Logging already initialized")]
    LoggingAlreadyInitialized,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn policy(field: &str, message: impl Into<String>) -> Self {
        Error::InvalidPolicy {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
