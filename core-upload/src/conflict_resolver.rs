//! # Conflict Resolution
//!
//! Detects queued files whose name already exists in the user's listing and
//! turns a user-chosen [`ConflictResolution`] into an [`UploadPlan`].
//!
//! ## Resolutions
//!
//! - **Cancel**: drop the whole pending batch; nothing is uploaded
//! - **Replace**: delete each conflicting remote object, then upload the
//!   queued file under the same name
//! - **RenameOnConflict**: upload each conflicting file as
//!   `{base}_updated_{millis}{ext}` and leave the remote original alone
//!
//! Non-conflicting files upload unchanged under every resolution except
//! Cancel. One clock reading stamps every rename in a batch.
//!
//! ## Usage
//!
//! ```no_run
//! use core_upload::{ConflictResolution, ConflictResolver, IngestQueue, ListingCache};
//! use bridge_traits::SystemClock;
//! use std::sync::Arc;
//!
//! # fn example(queue: &mut IngestQueue, cache: &ListingCache) {
//! let resolver = ConflictResolver::new(Arc::new(SystemClock));
//! let conflicts = resolver.detect_conflicts(queue.files(), cache.entries());
//!
//! let plan = if conflicts.is_empty() {
//!     ConflictResolver::plan_all(queue.files())
//! } else {
//!     resolver.resolve(queue, &conflicts, ConflictResolution::RenameOnConflict)
//! };
//! # }
//! ```

use bridge_traits::time::Clock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::{Result, UploadError};
use crate::ingest_queue::IngestQueue;
use crate::paths::split_extension;
use crate::types::{PendingFile, RemoteFile};

/// A queued file whose name is already taken in the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub pending: PendingFile,
    pub existing: RemoteFile,
}

impl Conflict {
    pub fn name(&self) -> &str {
        &self.pending.name
    }
}

/// How the user chose to settle a set of conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Abandon the pending batch
    Cancel,
    /// Overwrite the remote objects
    Replace,
    /// Keep both by renaming the incoming files
    RenameOnConflict,
}

impl ConflictResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictResolution::Cancel => "cancel",
            ConflictResolution::Replace => "replace",
            ConflictResolution::RenameOnConflict => "rename_on_conflict",
        }
    }
}

impl FromStr for ConflictResolution {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "cancel" => Ok(ConflictResolution::Cancel),
            "replace" => Ok(ConflictResolution::Replace),
            "rename_on_conflict" | "rename" => Ok(ConflictResolution::RenameOnConflict),
            _ => Err(UploadError::InvalidResolution(s.to_string())),
        }
    }
}

impl std::fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the coordinator does with one planned file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadAction {
    /// Plain put; no remote object by this name is known
    Create,
    /// Delete the existing remote object, then put
    Replace,
    /// Put under a new name; carries the name the user selected
    RenamedFrom(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpload {
    /// The file to store, already carrying its final name
    pub file: PendingFile,
    pub action: UploadAction,
}

/// Ordered list of puts for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadPlan {
    pub uploads: Vec<PlannedUpload>,
}

impl UploadPlan {
    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty()
    }

    pub fn len(&self) -> usize {
        self.uploads.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.uploads.iter().map(|upload| upload.file.size).sum()
    }

    /// Final names, in plan order
    pub fn names(&self) -> Vec<&str> {
        self.uploads
            .iter()
            .map(|upload| upload.file.name.as_str())
            .collect()
    }
}

pub struct ConflictResolver {
    clock: Arc<dyn Clock>,
}

impl ConflictResolver {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Queued files whose name is present in `remote`, in queue order.
    ///
    /// The result does not depend on the order of `remote`.
    pub fn detect_conflicts<'a>(
        &self,
        queue: &[PendingFile],
        remote: impl IntoIterator<Item = &'a RemoteFile>,
    ) -> Vec<Conflict> {
        let index: HashMap<&str, &RemoteFile> = remote
            .into_iter()
            .map(|file| (file.name.as_str(), file))
            .collect();

        let conflicts: Vec<Conflict> = queue
            .iter()
            .filter_map(|pending| {
                index.get(pending.name.as_str()).map(|existing| Conflict {
                    pending: pending.clone(),
                    existing: (*existing).clone(),
                })
            })
            .collect();

        if !conflicts.is_empty() {
            debug!(count = conflicts.len(), "Detected name conflicts");
        }
        conflicts
    }

    /// Plan for a batch without conflicts: every file is a plain create.
    pub fn plan_all(queue: &[PendingFile]) -> UploadPlan {
        UploadPlan {
            uploads: queue
                .iter()
                .map(|file| PlannedUpload {
                    file: file.clone(),
                    action: UploadAction::Create,
                })
                .collect(),
        }
    }

    /// Apply `resolution` to every conflict at once.
    ///
    /// Cancel clears `queue` and yields an empty plan. Otherwise the queue is
    /// left as is; it is cleared once the batch succeeds.
    #[instrument(skip(self, queue, conflicts, resolution), fields(conflicts = conflicts.len(), resolution = %resolution))]
    pub fn resolve(
        &self,
        queue: &mut IngestQueue,
        conflicts: &[Conflict],
        resolution: ConflictResolution,
    ) -> UploadPlan {
        if resolution == ConflictResolution::Cancel {
            info!(dropped = queue.len(), "Pending batch cancelled");
            queue.clear();
            return UploadPlan::default();
        }

        let conflicting: HashSet<&str> = conflicts.iter().map(Conflict::name).collect();
        let stamp = self.clock.unix_timestamp_millis();

        let uploads = queue
            .files()
            .iter()
            .map(|file| {
                if !conflicting.contains(file.name.as_str()) {
                    return PlannedUpload {
                        file: file.clone(),
                        action: UploadAction::Create,
                    };
                }
                match resolution {
                    ConflictResolution::RenameOnConflict => PlannedUpload {
                        file: file.renamed(renamed_name(&file.name, stamp)),
                        action: UploadAction::RenamedFrom(file.name.clone()),
                    },
                    _ => PlannedUpload {
                        file: file.clone(),
                        action: UploadAction::Replace,
                    },
                }
            })
            .collect();

        UploadPlan { uploads }
    }
}

/// `{base}_updated_{millis}{ext}`, splitting at the last `.`.
///
/// ```
/// use core_upload::conflict_resolver::renamed_name;
///
/// assert_eq!(renamed_name("cat.png", 1700000000000), "cat_updated_1700000000000.png");
/// assert_eq!(renamed_name("README", 5), "README_updated_5");
/// ```
pub fn renamed_name(name: &str, millis: i64) -> String {
    let (base, ext) = split_extension(name);
    format!("{}_updated_{}{}", base, millis, ext)
}
