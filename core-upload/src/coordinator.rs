//! # Upload Coordinator
//!
//! Runs upload batches against an [`ObjectStore`] and keeps a
//! [`ListingCache`] in step with what the store confirmed.
//!
//! ## Overview
//!
//! - Puts run concurrently, at most `max_concurrent_uploads` at a time
//! - Aggregate progress (`Σ transferred / Σ total × 100`) is pushed to the
//!   caller after every observation from any put
//! - A failed put never rolls back the others; the [`BatchReport`] lists
//!   exactly which files were stored and which were not
//! - [`UploadHandle::cancel`] abandons in-flight puts; files already stored
//!   stay stored
//!
//! ## Workflow
//!
//! 1. Move the batch to `Uploading` and emit `UploadEvent::Started`
//! 2. For each planned file: delete the existing object first when the plan
//!    says Replace, then put under `{root}/{uid}/{name}`
//! 3. Settle the batch as `Succeeded`, `Failed` or `Cancelled`
//! 4. [`UploadCoordinator::reconcile`] refreshes the listing from the store,
//!    or patches it with the confirmed files if the refresh fails
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut handle = coordinator.upload(&uid, UploadBatch::new(n, bytes), plan)?;
//! while let Some(progress) = handle.next_progress().await {
//!     println!("{:.0}%", progress.percent);
//! }
//! let report = handle.finish().await?;
//! coordinator.reconcile(&uid, &report, &mut cache).await;
//! ```

use bridge_traits::error::BridgeError;
use bridge_traits::storage::{ObjectHandle, ObjectStore, TransferProgress};
use core_auth::UserId;
use core_runtime::config::UploadPolicy;
use core_runtime::events::{CoreEvent, EventBus, ListingEvent, UploadEvent};
use core_runtime::logging::strip_path;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::batch::{BatchId, BatchStatus, UploadBatch};
use crate::conflict_resolver::{PlannedUpload, UploadAction, UploadPlan};
use crate::error::{Result, UploadError};
use crate::listing_cache::ListingCache;
use crate::paths::{extension_of, is_single_segment, object_key, user_prefix};
use crate::progress::ProgressAggregator;
use crate::types::{PendingFile, RemoteFile};

// ============================================================================
// Reports
// ============================================================================

/// Aggregate progress of a running batch
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UploadProgress {
    /// `0.0..=100.0`
    pub percent: f64,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

/// What happened to one planned file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Stored {
        name: String,
        handle: ObjectHandle,
        size: u64,
        action: UploadAction,
    },
    Failed {
        name: String,
        message: String,
    },
    /// The batch was cancelled before this put finished
    Cancelled {
        name: String,
    },
}

impl FileOutcome {
    pub fn name(&self) -> &str {
        match self {
            FileOutcome::Stored { name, .. }
            | FileOutcome::Failed { name, .. }
            | FileOutcome::Cancelled { name } => name,
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, FileOutcome::Stored { .. })
    }
}

/// Final state of a batch, with one outcome per planned file in plan order.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch: UploadBatch,
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn batch_id(&self) -> BatchId {
        self.batch.id
    }

    pub fn status(&self) -> BatchStatus {
        self.batch.status
    }

    pub fn stored_names(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.is_stored())
            .map(FileOutcome::name)
            .collect()
    }

    /// `(name, message)` for every file that was not stored because its put
    /// failed
    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                FileOutcome::Failed { name, message } => Some((name.as_str(), message.as_str())),
                _ => None,
            })
            .collect()
    }
}

/// Per-name result of [`UploadCoordinator::delete_many`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<DeleteFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteFailure {
    pub name: String,
    pub message: String,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ============================================================================
// Handle
// ============================================================================

/// A running batch.
///
/// Progress observations can be read until the batch settles; the stream
/// then ends and [`finish`](Self::finish) yields the report. Dropping the
/// handle does not stop the batch.
pub struct UploadHandle {
    batch_id: BatchId,
    progress: mpsc::UnboundedReceiver<UploadProgress>,
    status: watch::Receiver<BatchStatus>,
    cancel: CancellationToken,
    task: JoinHandle<BatchReport>,
}

impl UploadHandle {
    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    /// Next aggregate progress observation, or `None` once the batch settled.
    pub async fn next_progress(&mut self) -> Option<UploadProgress> {
        self.progress.recv().await
    }

    pub fn status(&self) -> BatchStatus {
        *self.status.borrow()
    }

    /// Receiver that observes the batch status until it is terminal
    pub fn status_watch(&self) -> watch::Receiver<BatchStatus> {
        self.status.clone()
    }

    /// Abandon puts that have not finished
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the batch to settle.
    pub async fn finish(self) -> Result<BatchReport> {
        self.task
            .await
            .map_err(|e| UploadError::TaskFailed(e.to_string()))
    }
}

impl std::fmt::Debug for UploadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadHandle")
            .field("batch_id", &self.batch_id)
            .field("status", &self.status())
            .finish()
    }
}

// ============================================================================
// Coordinator
// ============================================================================

#[derive(Clone)]
pub struct UploadCoordinator {
    store: Arc<dyn ObjectStore>,
    policy: UploadPolicy,
    event_bus: EventBus,
}

impl UploadCoordinator {
    pub fn new(store: Arc<dyn ObjectStore>, policy: UploadPolicy, event_bus: EventBus) -> Self {
        Self {
            store,
            policy,
            event_bus,
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Start uploading `plan` in the background.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if `batch` cannot move to `Uploading`.
    pub fn upload(&self, uid: &UserId, batch: UploadBatch, plan: UploadPlan) -> Result<UploadHandle> {
        let batch = batch.start_upload()?;
        let batch_id = batch.id;

        let cancel = CancellationToken::new();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(BatchStatus::Uploading);

        self.emit(UploadEvent::Started {
            batch_id: batch_id.to_string(),
            file_count: plan.len(),
            total_bytes: plan.total_bytes(),
        });
        info!(
            batch_id = %batch_id,
            files = plan.len(),
            bytes = plan.total_bytes(),
            "Starting upload batch"
        );

        let coordinator = self.clone();
        let uid = uid.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let report = coordinator
                .run_batch(&uid, batch, plan, progress_tx, token)
                .await;
            let _ = status_tx.send(report.status());
            report
        });

        Ok(UploadHandle {
            batch_id,
            progress: progress_rx,
            status: status_rx,
            cancel,
            task,
        })
    }

    #[instrument(skip_all, fields(batch_id = %batch.id, files = plan.len()))]
    async fn run_batch(
        &self,
        uid: &UserId,
        batch: UploadBatch,
        plan: UploadPlan,
        progress_tx: mpsc::UnboundedSender<UploadProgress>,
        cancel: CancellationToken,
    ) -> BatchReport {
        let tracker = ProgressTracker::new(
            batch.id,
            plan.uploads.iter().map(|upload| upload.file.size),
            progress_tx,
            self.event_bus.clone(),
        );
        let semaphore = Semaphore::new(self.policy.max_concurrent_uploads.max(1));

        let outcomes = join_all(plan.uploads.into_iter().enumerate().map(|(slot, upload)| {
            self.upload_one(uid, slot, upload, batch.id, &semaphore, &tracker, &cancel)
        }))
        .await;

        let cancelled = outcomes
            .iter()
            .any(|outcome| matches!(outcome, FileOutcome::Cancelled { .. }));
        let failed: Vec<&str> = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, FileOutcome::Failed { .. }))
            .map(FileOutcome::name)
            .collect();
        let stored = outcomes.iter().filter(|outcome| outcome.is_stored()).count();

        let settled = if cancelled {
            batch.clone().cancel()
        } else if failed.is_empty() {
            batch.clone().succeed()
        } else {
            batch
                .clone()
                .fail(format!("Failed to upload: {}", failed.join(", ")))
        };
        let batch = settled.unwrap_or_else(|e| {
            warn!(error = %e, "Could not settle batch state");
            batch
        });

        if batch.status == BatchStatus::Cancelled {
            info!(stored, "Upload batch cancelled");
            self.emit(UploadEvent::Cancelled {
                batch_id: batch.id.to_string(),
            });
        } else {
            info!(stored, failed = failed.len(), status = %batch.status, "Upload batch finished");
            self.emit(UploadEvent::Completed {
                batch_id: batch.id.to_string(),
                succeeded: stored,
                failed: failed.len(),
            });
        }

        BatchReport { batch, outcomes }
    }

    #[allow(clippy::too_many_arguments)]
    async fn upload_one(
        &self,
        uid: &UserId,
        slot: usize,
        upload: PlannedUpload,
        batch_id: BatchId,
        semaphore: &Semaphore,
        tracker: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> FileOutcome {
        let PlannedUpload { file, action } = upload;
        let name = file.name.clone();

        let _permit = tokio::select! {
            _ = cancel.cancelled() => return FileOutcome::Cancelled { name },
            permit = semaphore.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return FileOutcome::Cancelled { name },
            },
        };

        let key = object_key(&self.policy.namespace_root, uid, &file.name);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(file = %name, "Put abandoned");
                return FileOutcome::Cancelled { name };
            }
            result = self.transfer(slot, &key, &file, &action, batch_id, tracker) => result,
        };

        match result {
            Ok(handle) => {
                tracker.complete(slot);
                debug!(file = %name, "Stored");
                self.emit(UploadEvent::FileStored {
                    batch_id: batch_id.to_string(),
                    name: name.clone(),
                });
                FileOutcome::Stored {
                    name,
                    handle,
                    size: file.size,
                    action,
                }
            }
            Err(message) => {
                tracker.mark_failed();
                warn!(file = %name, error = %message, "Put failed");
                self.emit(UploadEvent::FileFailed {
                    batch_id: batch_id.to_string(),
                    name: name.clone(),
                    message: message.clone(),
                });
                FileOutcome::Failed { name, message }
            }
        }
    }

    async fn transfer(
        &self,
        slot: usize,
        key: &str,
        file: &PendingFile,
        action: &UploadAction,
        batch_id: BatchId,
        tracker: &ProgressTracker,
    ) -> std::result::Result<ObjectHandle, String> {
        if *action == UploadAction::Replace {
            match self.store.delete_object(key).await {
                Ok(()) => self.emit(UploadEvent::Replaced {
                    batch_id: batch_id.to_string(),
                    name: file.name.clone(),
                }),
                Err(BridgeError::NotFound(_)) => {
                    debug!(file = %file.name, "Object to replace was already gone")
                }
                Err(e) => return Err(format!("Could not remove the existing file: {}", e)),
            }
        }

        let content_type = file.mime_type.clone().or_else(|| {
            extension_of(&file.name)
                .and_then(|ext| self.policy.mime_for_extension(ext))
                .map(str::to_string)
        });

        let (tx, mut rx) = mpsc::unbounded_channel::<TransferProgress>();
        let put = self
            .store
            .put_object(key, file.bytes.clone(), content_type.as_deref(), tx);
        let forward = async {
            while let Some(progress) = rx.recv().await {
                tracker.observe(slot, progress);
            }
        };

        let (result, ()) = tokio::join!(put, forward);
        result.map_err(|e| e.to_string())
    }

    /// Re-read the listing for `uid` from the store.
    #[instrument(skip(self, uid, cache), fields(uid = %uid))]
    pub async fn refresh(&self, uid: &UserId, cache: &mut ListingCache) -> Result<usize> {
        let prefix = user_prefix(&self.policy.namespace_root, uid);
        match cache.refresh(self.store.as_ref(), &prefix).await {
            Ok(count) => {
                self.emit_listing(ListingEvent::Refreshed { count });
                Ok(count)
            }
            Err(e) => {
                self.emit_listing(ListingEvent::RefreshFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Bring `cache` in line with a settled batch.
    ///
    /// Prefers an authoritative refresh. When that fails, every stored file
    /// is inserted locally (URL resolved best effort) and the cache is marked
    /// stale. Returns whether the refresh succeeded.
    #[instrument(skip(self, uid, report, cache), fields(uid = %uid, batch_id = %report.batch_id()))]
    pub async fn reconcile(&self, uid: &UserId, report: &BatchReport, cache: &mut ListingCache) -> bool {
        let refresh_error = match self.refresh(uid, cache).await {
            Ok(_) => return true,
            Err(e) => e,
        };
        warn!(error = %refresh_error, "Listing refresh after upload failed; patching locally");

        for outcome in &report.outcomes {
            let FileOutcome::Stored {
                name, handle, size, ..
            } = outcome
            else {
                continue;
            };

            let url = match self.store.resolve_download_url(handle).await {
                Ok(url) => url,
                Err(e) => {
                    debug!(file = %strip_path(&handle.key), error = %e, "No download URL yet");
                    String::new()
                }
            };
            cache.insert_confirmed(RemoteFile {
                name: name.clone(),
                url,
                size: Some(*size),
            });
        }
        cache.mark_stale();
        false
    }

    /// Delete one of `uid`'s files.
    ///
    /// An object that is already gone counts as deleted. The cache entry is
    /// removed only once the store confirmed.
    #[instrument(skip(self, uid, cache), fields(uid = %uid))]
    pub async fn delete(&self, uid: &UserId, name: &str, cache: &mut ListingCache) -> Result<()> {
        match self.delete_object(uid, name).await {
            Ok(()) => {
                cache.remove(name);
                self.emit_listing(ListingEvent::FileDeleted {
                    name: name.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                warn!(file = %name, error = %e, "Delete failed");
                self.emit_listing(ListingEvent::DeleteFailed {
                    name: name.to_string(),
                    message: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    /// Delete several files concurrently and report each name's outcome, in
    /// input order.
    #[instrument(skip(self, uid, names, cache), fields(uid = %uid, count = names.len()))]
    pub async fn delete_many(
        &self,
        uid: &UserId,
        names: &[String],
        cache: &mut ListingCache,
    ) -> DeleteReport {
        let results: Vec<_> = stream::iter(names.iter().map(|name| async move {
            (name, self.delete_object(uid, name).await)
        }))
        .buffered(self.policy.max_concurrent_uploads.max(1))
        .collect()
        .await;

        let mut report = DeleteReport::default();
        for (name, result) in results {
            match result {
                Ok(()) => {
                    cache.remove(name);
                    self.emit_listing(ListingEvent::FileDeleted { name: name.clone() });
                    report.succeeded.push(name.clone());
                }
                Err(e) => {
                    self.emit_listing(ListingEvent::DeleteFailed {
                        name: name.clone(),
                        message: e.to_string(),
                    });
                    report.failed.push(DeleteFailure {
                        name: name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            deleted = report.succeeded.len(),
            failed = report.failed.len(),
            "Bulk delete finished"
        );
        report
    }

    /// Download URL for a stored file, straight from the store.
    pub async fn resolve_url(&self, uid: &UserId, name: &str) -> Result<String> {
        if !is_single_segment(name) {
            return Err(BridgeError::InvalidKey(name.to_string()).into());
        }
        let handle = ObjectHandle::new(object_key(&self.policy.namespace_root, uid, name));
        Ok(self.store.resolve_download_url(&handle).await?)
    }

    async fn delete_object(&self, uid: &UserId, name: &str) -> bridge_traits::error::Result<()> {
        if !is_single_segment(name) {
            return Err(BridgeError::InvalidKey(name.to_string()));
        }
        let key = object_key(&self.policy.namespace_root, uid, name);
        match self.store.delete_object(&key).await {
            Err(BridgeError::NotFound(_)) => {
                debug!(file = %name, "Object was already gone");
                Ok(())
            }
            other => other,
        }
    }

    fn emit(&self, event: UploadEvent) {
        self.event_bus.emit(CoreEvent::Upload(event)).ok();
    }

    fn emit_listing(&self, event: ListingEvent) {
        self.event_bus.emit(CoreEvent::Listing(event)).ok();
    }
}

// ============================================================================
// Progress Tracking
// ============================================================================

/// Shared by every put of a batch; turns per-file observations into
/// aggregate updates for the handle and the event bus.
struct ProgressTracker {
    batch_id: BatchId,
    state: Mutex<TrackerState>,
    /// Set on the first failed put; no further ticks are published
    failed: AtomicBool,
    tx: mpsc::UnboundedSender<UploadProgress>,
    event_bus: EventBus,
}

struct TrackerState {
    aggregator: ProgressAggregator,
    last_bytes: Option<u64>,
    last_percent: Option<u8>,
}

impl ProgressTracker {
    fn new(
        batch_id: BatchId,
        sizes: impl IntoIterator<Item = u64>,
        tx: mpsc::UnboundedSender<UploadProgress>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            batch_id,
            state: Mutex::new(TrackerState {
                aggregator: ProgressAggregator::new(sizes),
                last_bytes: None,
                last_percent: None,
            }),
            failed: AtomicBool::new(false),
            tx,
            event_bus,
        }
    }

    fn observe(&self, slot: usize, progress: TransferProgress) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.aggregator.update(slot, progress);
        self.publish(&mut state);
    }

    fn complete(&self, slot: usize) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.aggregator.complete(slot);
        self.publish(&mut state);
    }

    fn mark_failed(&self) {
        self.failed.store(true, Ordering::Release);
    }

    fn publish(&self, state: &mut TrackerState) {
        if self.failed.load(Ordering::Acquire) {
            return;
        }

        let bytes = state.aggregator.transferred_bytes();
        if state.last_bytes.is_some_and(|last| bytes <= last) {
            return;
        }
        state.last_bytes = Some(bytes);

        let _ = self.tx.send(UploadProgress {
            percent: state.aggregator.percent(),
            bytes_transferred: bytes,
            total_bytes: state.aggregator.total_bytes(),
        });

        let percent = state.aggregator.percent_floor();
        if state.last_percent != Some(percent) {
            state.last_percent = Some(percent);
            self.event_bus
                .emit(CoreEvent::Upload(UploadEvent::Progress {
                    batch_id: self.batch_id.to_string(),
                    percent,
                }))
                .ok();
        }
    }
}
