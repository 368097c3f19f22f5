//! # File Manager
//!
//! One owned object holding everything a signed-in user's file view needs:
//! the session, the ingest queue, pending conflicts, the listing cache and
//! the upload coordinator.
//!
//! ## Workflow
//!
//! ```text
//! select_files ──> queue ──> begin_upload ──┬──> Started(handle) ──> finish_upload
//!                                           │
//!                                           └──> ConflictsPending ──> resolve_conflicts
//!                                                                       ├──> Started(handle)
//!                                                                       └──> Cancelled
//! ```
//!
//! A new batch is refused while the previous one is still uploading. A
//! succeeded batch takes its own files off the queue, so files selected after
//! it settled stay queued; cancelling at the conflict prompt clears the queue
//! and a failed batch leaves it in place for a retry.

use std::sync::Arc;

use core_auth::{AuthManager, UserId, UserIdentity};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, EventStream, UploadEvent};
use core_upload::{
    BatchId, BatchReport, BatchStatus, Conflict, ConflictResolution, ConflictResolver,
    DeleteReport, IngestQueue, ListingCache, PendingFile, Rejection, RemoteFile, UploadBatch,
    UploadAction, UploadCoordinator, UploadError, UploadHandle, UploadPlan, Validator,
};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;

/// What happened to a selection of files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionReport {
    /// Names added to the queue, in selection order
    pub queued: Vec<String>,
    /// Files that failed validation
    pub rejected: Vec<Rejection>,
    /// Valid files whose name was already queued
    pub duplicates: Vec<String>,
    /// Queue length afterwards
    pub queue_len: usize,
}

/// Result of asking for an upload.
#[derive(Debug)]
pub enum UploadStart {
    /// The batch is running; drive it with the handle and pass it back to
    /// [`FileManager::finish_upload`]
    Started(UploadHandle),
    /// Some queued names already exist remotely; nothing was uploaded
    ConflictsPending(Vec<Conflict>),
    /// The queue is empty
    NothingQueued,
    /// The user chose to drop the batch
    Cancelled,
}

/// A batch that stopped for a conflict decision.
struct AwaitingBatch {
    batch: UploadBatch,
    conflicts: Vec<Conflict>,
}

/// A batch handed to the coordinator.
struct InFlight {
    batch_id: BatchId,
    uid: UserId,
    status: watch::Receiver<BatchStatus>,
    /// Queue names the batch was planned from
    queued_names: Vec<String>,
}

/// Façade wiring auth, queue, conflict resolution, uploads and listing.
pub struct FileManager {
    auth: Arc<AuthManager>,
    event_bus: EventBus,
    validator: Validator,
    resolver: ConflictResolver,
    coordinator: UploadCoordinator,
    queue: IngestQueue,
    cache: ListingCache,
    awaiting: Option<AwaitingBatch>,
    in_flight: Option<InFlight>,
}

impl FileManager {
    pub fn new(config: CoreConfig) -> Self {
        let event_bus = EventBus::new(config.event_buffer_size);
        Self::with_event_bus(config, event_bus)
    }

    /// Build on an existing bus, e.g. one the host already subscribed to.
    pub fn with_event_bus(config: CoreConfig, event_bus: EventBus) -> Self {
        let policy = config.upload_policy;
        Self {
            auth: Arc::new(AuthManager::new(
                config.identity_provider,
                event_bus.clone(),
            )),
            validator: Validator::new(policy.clone()),
            resolver: ConflictResolver::new(config.clock),
            coordinator: UploadCoordinator::new(config.object_store, policy, event_bus.clone()),
            event_bus,
            queue: IngestQueue::new(),
            cache: ListingCache::new(),
            awaiting: None,
            in_flight: None,
        }
    }

    pub fn auth(&self) -> Arc<AuthManager> {
        Arc::clone(&self.auth)
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Sign in. Switching to a different user drops the previous user's
    /// listing and any pending conflict decision.
    pub async fn sign_in(&mut self) -> Result<UserIdentity> {
        let previous = self.auth.current_user().await.map(|user| user.uid);
        let identity = self.auth.sign_in().await?;

        if previous.as_ref() != Some(&identity.uid) {
            self.cache.clear();
            self.awaiting = None;
        }
        Ok(identity)
    }

    /// Sign out and forget everything tied to the session.
    pub async fn sign_out(&mut self) -> Result<()> {
        self.auth.sign_out().await?;
        self.cache.clear();
        self.queue.clear();
        self.awaiting = None;
        Ok(())
    }

    pub async fn current_user(&self) -> Option<UserIdentity> {
        self.auth.current_user().await
    }

    // ========================================================================
    // Queue
    // ========================================================================

    /// Validate `files` and queue the ones that pass.
    ///
    /// Rejections do not stop the rest of the selection. Selecting while a
    /// conflict decision is pending discards that decision; the next
    /// [`begin_upload`](Self::begin_upload) checks the whole queue again.
    ///
    /// # Errors
    ///
    /// `UploadError::BatchInProgress` while a batch is uploading.
    #[instrument(skip_all)]
    pub fn select_files(
        &mut self,
        files: impl IntoIterator<Item = PendingFile>,
    ) -> Result<SelectionReport> {
        self.ensure_idle()?;

        let validation = self.validator.validate_batch(files);
        for rejection in &validation.rejected {
            info!(file = %rejection.name, reason = %rejection.reason, "File rejected");
        }

        let state = self.queue.enqueue(validation.accepted);
        if !state.accepted.is_empty() {
            self.drop_awaiting("selection changed");
        }

        Ok(SelectionReport {
            queued: state.accepted,
            rejected: validation.rejected,
            duplicates: state.duplicates,
            queue_len: state.len,
        })
    }

    pub fn queued_files(&self) -> &[PendingFile] {
        self.queue.files()
    }

    /// Remove one file from the queue.
    pub fn discard(&mut self, name: &str) -> Option<PendingFile> {
        let removed = self.queue.remove(name);
        if removed.is_some() {
            self.drop_awaiting("selection changed");
        }
        removed
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
        self.drop_awaiting("queue cleared");
    }

    // ========================================================================
    // Uploads
    // ========================================================================

    /// Whether a batch is still running
    pub fn is_uploading(&self) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.status.borrow().is_active())
    }

    /// Conflicts waiting for [`resolve_conflicts`](Self::resolve_conflicts)
    pub fn pending_conflicts(&self) -> &[Conflict] {
        self.awaiting
            .as_ref()
            .map(|awaiting| awaiting.conflicts.as_slice())
            .unwrap_or_default()
    }

    /// Upload the queue, or stop at the conflict prompt.
    ///
    /// The listing is refreshed first when it was never loaded or is stale,
    /// so conflicts are checked against what the store holds.
    ///
    /// # Errors
    ///
    /// - `UploadError::BatchInProgress` while a batch is uploading
    /// - `UploadError::ConflictsUnresolved` while a decision is pending
    /// - `AuthError::NotAuthenticated` when signed out
    /// - `UploadError::Listing` when the listing cannot be loaded
    #[instrument(skip(self))]
    pub async fn begin_upload(&mut self) -> Result<UploadStart> {
        self.ensure_idle()?;
        if let Some(awaiting) = &self.awaiting {
            return Err(UploadError::ConflictsUnresolved {
                count: awaiting.conflicts.len(),
            }
            .into());
        }

        let user = self.auth.require_user().await?;
        if self.queue.is_empty() {
            debug!("Upload requested with an empty queue");
            return Ok(UploadStart::NothingQueued);
        }

        // Files were validated on selection.
        let batch =
            UploadBatch::new(self.queue.len(), self.queue.total_bytes()).begin_validation()?;

        if self.cache.last_refreshed().is_none() || self.cache.is_stale() {
            self.coordinator.refresh(&user.uid, &mut self.cache).await?;
        }

        let batch = batch.begin_conflict_check()?;
        let conflicts = self
            .resolver
            .detect_conflicts(self.queue.files(), self.cache.entries());

        if conflicts.is_empty() {
            let plan = ConflictResolver::plan_all(self.queue.files());
            return self.start(&user.uid, batch, plan);
        }

        info!(
            batch_id = %batch.id,
            conflicts = conflicts.len(),
            "Waiting for a conflict resolution"
        );
        let batch = batch.await_resolution()?;
        self.awaiting = Some(AwaitingBatch {
            batch,
            conflicts: conflicts.clone(),
        });
        Ok(UploadStart::ConflictsPending(conflicts))
    }

    /// Apply one resolution to every pending conflict.
    ///
    /// # Errors
    ///
    /// - `UploadError::NoConflictsPending` when there is nothing to decide
    /// - `AuthError::NotAuthenticated` when signed out
    #[instrument(skip(self))]
    pub async fn resolve_conflicts(&mut self, resolution: ConflictResolution) -> Result<UploadStart> {
        let user = self.auth.require_user().await?;
        let AwaitingBatch { batch, conflicts } = self
            .awaiting
            .take()
            .ok_or(UploadError::NoConflictsPending)?;

        let plan = self.resolver.resolve(&mut self.queue, &conflicts, resolution);

        if resolution == ConflictResolution::Cancel {
            let batch = batch.cancel()?;
            let _ = self.event_bus.emit(CoreEvent::Upload(UploadEvent::Cancelled {
                batch_id: batch.id.to_string(),
            }));
            return Ok(UploadStart::Cancelled);
        }

        self.start(&user.uid, batch, plan)
    }

    /// Wait for a batch started by this manager and bring the listing up to
    /// date with it.
    #[instrument(skip_all, fields(batch_id = %handle.batch_id()))]
    pub async fn finish_upload(&mut self, handle: UploadHandle) -> Result<BatchReport> {
        let batch_id = handle.batch_id();
        let report = handle.finish().await?;

        let in_flight = match &self.in_flight {
            Some(in_flight) if in_flight.batch_id == batch_id => self.in_flight.take(),
            _ => None,
        };

        let current = self.auth.current_user().await.map(|user| user.uid);
        match &in_flight {
            Some(in_flight) if current.as_ref() == Some(&in_flight.uid) => {
                self.coordinator
                    .reconcile(&in_flight.uid, &report, &mut self.cache)
                    .await;
            }
            Some(_) => debug!("Session changed during the upload; listing left alone"),
            None => warn!("Finished a batch this manager is not tracking"),
        }

        if report.status() == BatchStatus::Succeeded {
            let names = in_flight.map(|in_flight| in_flight.queued_names).unwrap_or_default();
            for name in &names {
                self.queue.remove(name);
            }
            debug!(removed = names.len(), remaining = self.queue.len(), "Uploaded files dequeued");
        }
        Ok(report)
    }

    fn start(&mut self, uid: &UserId, batch: UploadBatch, plan: UploadPlan) -> Result<UploadStart> {
        let queued_names = plan
            .uploads
            .iter()
            .map(|upload| match &upload.action {
                UploadAction::RenamedFrom(original) => original.clone(),
                UploadAction::Create | UploadAction::Replace => upload.file.name.clone(),
            })
            .collect();
        let handle = self.coordinator.upload(uid, batch, plan)?;
        self.in_flight = Some(InFlight {
            batch_id: handle.batch_id(),
            uid: uid.clone(),
            status: handle.status_watch(),
            queued_names,
        });
        Ok(UploadStart::Started(handle))
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.is_uploading() {
            return Err(UploadError::BatchInProgress.into());
        }
        Ok(())
    }

    fn drop_awaiting(&mut self, reason: &str) {
        if let Some(awaiting) = self.awaiting.take() {
            debug!(batch_id = %awaiting.batch.id, reason, "Dropping pending conflict decision");
        }
    }

    // ========================================================================
    // Listing
    // ========================================================================

    /// Reload the signed-in user's listing from the store.
    pub async fn refresh_listing(&mut self) -> Result<usize> {
        let user = self.auth.require_user().await?;
        Ok(self.coordinator.refresh(&user.uid, &mut self.cache).await?)
    }

    /// Cached listing, sorted by name
    pub fn listing(&self) -> Vec<RemoteFile> {
        self.cache.to_vec()
    }

    /// Whether the listing may be missing changes from the store
    pub fn listing_is_stale(&self) -> bool {
        self.cache.is_stale()
    }

    pub async fn delete_file(&mut self, name: &str) -> Result<()> {
        let user = self.auth.require_user().await?;
        Ok(self
            .coordinator
            .delete(&user.uid, name, &mut self.cache)
            .await?)
    }

    /// Delete several files; the report says which names went through.
    pub async fn delete_selected(&mut self, names: &[String]) -> Result<DeleteReport> {
        let user = self.auth.require_user().await?;
        Ok(self
            .coordinator
            .delete_many(&user.uid, names, &mut self.cache)
            .await)
    }

    /// Download URL for one of the user's files, from the cache when known.
    pub async fn download_url(&self, name: &str) -> Result<String> {
        let user = self.auth.require_user().await?;
        if let Some(file) = self.cache.get(name).filter(|file| file.has_url()) {
            return Ok(file.url.clone());
        }
        Ok(self.coordinator.resolve_url(&user.uid, name).await?)
    }
}

impl std::fmt::Debug for FileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileManager")
            .field("queued", &self.queue.len())
            .field("listed", &self.cache.len())
            .field("pending_conflicts", &self.pending_conflicts().len())
            .field("uploading", &self.is_uploading())
            .finish()
    }
}
