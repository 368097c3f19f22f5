//! # Upload Batch Lifecycle
//!
//! Typed identifiers and the state machine for one user-initiated upload.
//!
//! ## State Machine
//!
//! ```text
//! Idle -> Validating -> ConflictCheck -> AwaitingResolution -> Uploading
//!   |          |              |                                   |
//!   +----------+--------------+----------> Uploading              +-> Succeeded
//!                                                                 +-> Failed
//!                                                                 +-> Cancelled
//! ```
//!
//! `Idle`, `Validating` and `ConflictCheck` may go straight to `Uploading`
//! when there is nothing to resolve. Any non-terminal batch may fail or be
//! cancelled. Terminal batches never transition again, and never block the
//! next batch.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let batch = UploadBatch::new(2, 4096)
//!     .begin_validation()?
//!     .begin_conflict_check()?
//!     .start_upload()?;
//! let batch = batch.succeed()?;
//! assert!(batch.status.is_terminal());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, UploadError};

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for an upload batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for BatchId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Status
// ============================================================================

/// Where a batch is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    #[default]
    Idle,
    /// Selected files are being validated
    Validating,
    /// Queue is being compared against the listing
    ConflictCheck,
    /// Conflicts found; waiting for the user's resolution
    AwaitingResolution,
    /// Puts are in flight
    Uploading,
    /// Every planned file was stored
    Succeeded,
    /// At least one planned file was not stored
    Failed,
    /// The user cancelled the batch
    Cancelled,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Succeeded | BatchStatus::Failed | BatchStatus::Cancelled
        )
    }

    /// Whether a batch in this state blocks a new one from starting
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != BatchStatus::Idle
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Idle => "idle",
            BatchStatus::Validating => "validating",
            BatchStatus::ConflictCheck => "conflict_check",
            BatchStatus::AwaitingResolution => "awaiting_resolution",
            BatchStatus::Uploading => "uploading",
            BatchStatus::Succeeded => "succeeded",
            BatchStatus::Failed => "failed",
            BatchStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Batch Entity
// ============================================================================

/// One upload batch with state machine semantics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadBatch {
    pub id: BatchId,
    pub status: BatchStatus,
    /// Number of files in the batch
    pub file_count: usize,
    /// Sum of the files' sizes
    pub total_bytes: u64,
    /// Failure summary, set when the batch fails
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadBatch {
    pub fn new(file_count: usize, total_bytes: u64) -> Self {
        Self {
            id: BatchId::new(),
            status: BatchStatus::Idle,
            file_count,
            total_bytes,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn begin_validation(self) -> Result<Self> {
        self.transition(BatchStatus::Validating)
    }

    pub fn begin_conflict_check(self) -> Result<Self> {
        self.transition(BatchStatus::ConflictCheck)
    }

    pub fn await_resolution(self) -> Result<Self> {
        self.transition(BatchStatus::AwaitingResolution)
    }

    /// Start the puts
    ///
    /// # Errors
    ///
    /// Returns an error if the batch already uploaded or is terminal
    pub fn start_upload(mut self) -> Result<Self> {
        self.validate_transition(BatchStatus::Uploading)?;
        self.status = BatchStatus::Uploading;
        self.started_at = Some(Utc::now());
        Ok(self)
    }

    pub fn succeed(self) -> Result<Self> {
        self.finish(BatchStatus::Succeeded)
    }

    pub fn fail(mut self, error_message: impl Into<String>) -> Result<Self> {
        self.validate_transition(BatchStatus::Failed)?;
        self.error_message = Some(error_message.into());
        self.finish(BatchStatus::Failed)
    }

    pub fn cancel(self) -> Result<Self> {
        self.finish(BatchStatus::Cancelled)
    }

    /// Wall time spent uploading, once finished
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }

    fn transition(mut self, to: BatchStatus) -> Result<Self> {
        self.validate_transition(to)?;
        self.status = to;
        Ok(self)
    }

    fn finish(mut self, to: BatchStatus) -> Result<Self> {
        self.validate_transition(to)?;
        self.status = to;
        self.completed_at = Some(Utc::now());
        Ok(self)
    }

    fn validate_transition(&self, to: BatchStatus) -> Result<()> {
        use BatchStatus::*;

        let valid = match (self.status, to) {
            (Idle, Validating | Uploading) => true,
            (Validating, ConflictCheck | Uploading) => true,
            (ConflictCheck, AwaitingResolution | Uploading) => true,
            (AwaitingResolution, Uploading) => true,
            (Uploading, Succeeded) => true,

            // Terminal states cannot transition
            (Succeeded | Failed | Cancelled, _) => false,

            (_, Failed | Cancelled) => true,
            _ => false,
        };

        if !valid {
            return Err(UploadError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.status.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}
