use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("An upload batch is already active")]
    BatchInProgress,

    #[error("{count} conflicting file(s) need a resolution before uploading")]
    ConflictsUnresolved { count: usize },

    #[error("Nothing is queued for upload")]
    NothingQueued,

    #[error("No conflicts are waiting for a resolution")]
    NoConflictsPending,

    #[error("Listing {prefix} failed: {message}")]
    Listing { prefix: String, message: String },

    #[error("Invalid conflict resolution: {0}")]
    InvalidResolution(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Upload task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, UploadError>;
