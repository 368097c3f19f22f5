//! # Upload Module
//!
//! Validation, queueing, conflict handling and concurrent upload of a user's
//! files to an object store.
//!
//! ## Overview
//!
//! ```text
//! selected files -> Validator -> IngestQueue -> ConflictResolver -> UploadCoordinator
//!                                                   ^                     |
//!                                                   +---- ListingCache <--+
//! ```
//!
//! - [`Validator`] applies the name, type and size rules
//! - [`IngestQueue`] holds accepted files, unique by name
//! - [`ConflictResolver`] finds name collisions with the listing and plans
//!   Cancel, Replace or RenameOnConflict
//! - [`UploadCoordinator`] runs concurrent puts with aggregate progress and
//!   per-file outcomes, then reconciles the [`ListingCache`]
//!
//! Every object lives at `uploads/{uid}/{file_name}` (see [`paths`]).

pub mod batch;
pub mod conflict_resolver;
pub mod coordinator;
pub mod error;
pub mod ingest_queue;
pub mod listing_cache;
pub mod paths;
pub mod progress;
pub mod types;
pub mod validator;

pub use batch::{BatchId, BatchStatus, UploadBatch};
pub use conflict_resolver::{
    Conflict, ConflictResolution, ConflictResolver, PlannedUpload, UploadAction, UploadPlan,
};
pub use coordinator::{
    BatchReport, DeleteFailure, DeleteReport, FileOutcome, UploadCoordinator, UploadHandle,
    UploadProgress,
};
pub use error::{Result, UploadError};
pub use ingest_queue::{IngestQueue, QueueState};
pub use listing_cache::ListingCache;
pub use progress::ProgressAggregator;
pub use types::{PendingFile, PreviewKind, RemoteFile};
pub use validator::{BatchValidation, Rejection, ValidationResult, Validator};
