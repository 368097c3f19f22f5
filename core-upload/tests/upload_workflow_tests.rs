//! Integration tests for the select → resolve → upload → reconcile workflow
//!
//! These tests drive the public API against an in-memory object store:
//! - Conflict-free uploads
//! - Cancel, Replace and RenameOnConflict resolutions
//! - Partial failure reporting
//! - Listing reconciliation when the store cannot be listed
//! - Bulk delete reporting

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    storage::{ObjectEntry, ObjectHandle, ObjectStore, ProgressSender, TransferProgress},
    FixedClock,
};
use bytes::Bytes;
use core_auth::UserId;
use core_runtime::config::UploadPolicy;
use core_runtime::events::{CoreEvent, EventBus, UploadEvent};
use core_upload::{
    BatchStatus, ConflictResolution, ConflictResolver, FileOutcome, IngestQueue, ListingCache,
    PendingFile, UploadAction, UploadBatch, UploadCoordinator, UploadPlan, Validator,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

const STAMP: i64 = 1_718_000_000_000;

// ============================================================================
// In-memory Store
// ============================================================================

#[derive(Default)]
struct MemoryStore {
    objects: AsyncMutex<BTreeMap<String, Bytes>>,
    /// File names whose put fails
    failing: HashSet<String>,
    list_unavailable: AtomicBool,
}

impl MemoryStore {
    fn failing_on(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|name| name.to_string()).collect(),
            ..Self::default()
        }
    }

    async fn seed(&self, key: &str, data: &'static [u8]) {
        self.objects
            .lock()
            .await
            .insert(key.to_string(), Bytes::from_static(data));
    }

    async fn content(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().await.get(key).cloned()
    }

    async fn keys(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(
        &self,
        key: &str,
        data: Bytes,
        _content_type: Option<&str>,
        progress: ProgressSender,
    ) -> BridgeResult<ObjectHandle> {
        let total = data.len() as u64;
        let _ = progress.send(TransferProgress::new(0, total));
        let _ = progress.send(TransferProgress::new(total / 2, total));

        let handle = ObjectHandle::new(key);
        if self.failing.contains(handle.file_name()) {
            return Err(BridgeError::OperationFailed("quota exceeded".to_string()));
        }

        let _ = progress.send(TransferProgress::new(total, total));
        self.objects.lock().await.insert(key.to_string(), data);
        Ok(handle.with_download_token("tok"))
    }

    async fn delete_object(&self, key: &str) -> BridgeResult<()> {
        match self.objects.lock().await.remove(key) {
            Some(_) => Ok(()),
            None => Err(BridgeError::NotFound(key.to_string())),
        }
    }

    async fn list_objects(&self, prefix: &str) -> BridgeResult<Vec<ObjectEntry>> {
        if self.list_unavailable.load(Ordering::SeqCst) {
            return Err(BridgeError::NotAvailable("listing offline".to_string()));
        }
        Ok(self
            .objects
            .lock()
            .await
            .iter()
            .filter_map(|(key, data)| {
                let name = key.strip_prefix(prefix)?;
                (!name.contains('/')).then(|| ObjectEntry {
                    name: name.to_string(),
                    handle: ObjectHandle::new(key.clone()),
                    size: Some(data.len() as u64),
                })
            })
            .collect())
    }

    async fn resolve_download_url(&self, handle: &ObjectHandle) -> BridgeResult<String> {
        Ok(format!("mem://{}", handle.key))
    }
}

// ============================================================================
// Helpers
// ============================================================================

struct Harness {
    store: Arc<MemoryStore>,
    coordinator: UploadCoordinator,
    resolver: ConflictResolver,
    queue: IngestQueue,
    cache: ListingCache,
    uid: UserId,
    bus: EventBus,
}

impl Harness {
    fn new(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        let bus = EventBus::new(256);
        Self {
            coordinator: UploadCoordinator::new(store.clone(), UploadPolicy::default(), bus.clone()),
            resolver: ConflictResolver::new(Arc::new(FixedClock::from_millis(STAMP))),
            queue: IngestQueue::new(),
            cache: ListingCache::new(),
            uid: UserId::parse("uid-1").unwrap(),
            store,
            bus,
        }
    }

    fn select(&mut self, files: Vec<PendingFile>) {
        let validation = Validator::new(UploadPolicy::default()).validate_batch(files);
        assert!(validation.all_accepted(), "{:?}", validation.rejected);
        self.queue.enqueue(validation.accepted);
    }

    async fn refresh(&mut self) {
        self.coordinator
            .refresh(&self.uid, &mut self.cache)
            .await
            .unwrap();
    }

    async fn upload(&mut self, plan: UploadPlan) -> core_upload::BatchReport {
        let batch = UploadBatch::new(plan.len(), plan.total_bytes());
        let handle = self.coordinator.upload(&self.uid, batch, plan).unwrap();
        let report = handle.finish().await.unwrap();
        self.coordinator
            .reconcile(&self.uid, &report, &mut self.cache)
            .await;
        if report.status() == BatchStatus::Succeeded {
            self.queue.clear();
        }
        report
    }

    fn listing_names(&self) -> Vec<String> {
        self.cache.entries().map(|file| file.name.clone()).collect()
    }
}

fn png(name: &str, content: &'static [u8]) -> PendingFile {
    PendingFile::new(name, Bytes::from_static(content), Some("image/png"))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_upload_without_conflicts_adds_one_entry() {
    let mut h = Harness::new(MemoryStore::default());
    h.refresh().await;

    let two_mb = vec![0u8; 2 * 1024 * 1024];
    h.select(vec![PendingFile::new("cat.png", two_mb, Some("image/png"))]);

    let conflicts = h.resolver.detect_conflicts(h.queue.files(), h.cache.entries());
    assert!(conflicts.is_empty());

    let report = h.upload(ConflictResolver::plan_all(h.queue.files())).await;
    assert_eq!(report.status(), BatchStatus::Succeeded);
    assert_eq!(h.listing_names(), vec!["cat.png"]);
    assert_eq!(
        h.cache.get("cat.png").unwrap().url,
        "mem://uploads/uid-1/cat.png"
    );
    assert!(h.queue.is_empty());
    assert!(!h.cache.is_stale());
}

#[tokio::test]
async fn test_cancel_resolution_changes_nothing_remote() {
    let mut h = Harness::new(MemoryStore::default());
    h.store.seed("uploads/uid-1/cat.png", b"old").await;
    h.refresh().await;

    h.select(vec![png("cat.png", b"new"), png("dog.png", b"woof")]);
    let conflicts = h.resolver.detect_conflicts(h.queue.files(), h.cache.entries());
    assert_eq!(conflicts.len(), 1);

    let plan = h
        .resolver
        .resolve(&mut h.queue, &conflicts, ConflictResolution::Cancel);

    assert!(plan.is_empty());
    assert!(h.queue.is_empty());
    assert_eq!(h.store.keys().await, vec!["uploads/uid-1/cat.png"]);
    assert_eq!(h.listing_names(), vec!["cat.png"]);
}

#[tokio::test]
async fn test_replace_resolution_overwrites_in_place() {
    let mut h = Harness::new(MemoryStore::default());
    h.store.seed("uploads/uid-1/cat.png", b"old").await;
    h.refresh().await;
    let mut events = h.bus.subscribe();

    h.select(vec![png("cat.png", b"new-cat")]);
    let conflicts = h.resolver.detect_conflicts(h.queue.files(), h.cache.entries());
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].existing.name, "cat.png");

    let plan = h
        .resolver
        .resolve(&mut h.queue, &conflicts, ConflictResolution::Replace);
    let report = h.upload(plan).await;

    assert_eq!(report.status(), BatchStatus::Succeeded);
    assert_eq!(h.listing_names(), vec!["cat.png"]);
    assert_eq!(
        h.store.content("uploads/uid-1/cat.png").await.unwrap(),
        Bytes::from_static(b"new-cat")
    );

    let mut replaced = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Upload(UploadEvent::Replaced { name, .. }) = event {
            replaced.push(name);
        }
    }
    assert_eq!(replaced, vec!["cat.png"]);
}

#[tokio::test]
async fn test_replace_only_touches_batch_names() {
    let mut h = Harness::new(MemoryStore::default());
    h.store.seed("uploads/uid-1/a.png", b"a-old").await;
    h.store.seed("uploads/uid-1/keep.pdf", b"pdf").await;
    h.refresh().await;

    h.select(vec![png("a.png", b"a-new"), png("b.png", b"b-new")]);
    let conflicts = h.resolver.detect_conflicts(h.queue.files(), h.cache.entries());
    let plan = h
        .resolver
        .resolve(&mut h.queue, &conflicts, ConflictResolution::Replace);
    h.upload(plan).await;

    assert_eq!(h.listing_names(), vec!["a.png", "b.png", "keep.pdf"]);
    assert_eq!(
        h.store.content("uploads/uid-1/keep.pdf").await.unwrap(),
        Bytes::from_static(b"pdf")
    );
}

#[tokio::test]
async fn test_rename_resolution_keeps_original() {
    let mut h = Harness::new(MemoryStore::default());
    h.store.seed("uploads/uid-1/report.pdf", b"v1").await;
    h.refresh().await;

    h.select(vec![PendingFile::new(
        "report.pdf",
        Bytes::from_static(b"v2"),
        Some("application/pdf"),
    )]);
    let conflicts = h.resolver.detect_conflicts(h.queue.files(), h.cache.entries());
    let plan = h.resolver.resolve(
        &mut h.queue,
        &conflicts,
        ConflictResolution::RenameOnConflict,
    );
    assert_eq!(
        plan.uploads[0].action,
        UploadAction::RenamedFrom("report.pdf".to_string())
    );

    let report = h.upload(plan).await;
    assert_eq!(report.status(), BatchStatus::Succeeded);

    let renamed = format!("report_updated_{}.pdf", STAMP);
    assert_eq!(h.listing_names(), vec!["report.pdf".to_string(), renamed.clone()]);
    assert_eq!(
        h.store.content("uploads/uid-1/report.pdf").await.unwrap(),
        Bytes::from_static(b"v1")
    );
    assert_eq!(
        h.store
            .content(&format!("uploads/uid-1/{}", renamed))
            .await
            .unwrap(),
        Bytes::from_static(b"v2")
    );
}

#[tokio::test]
async fn test_partial_failure_names_only_the_failed_file() {
    let mut h = Harness::new(MemoryStore::failing_on(&["b.png"]));
    h.refresh().await;

    h.select(vec![png("a.png", b"aaaa"), png("b.png", b"bbbb")]);
    let report = h.upload(ConflictResolver::plan_all(h.queue.files())).await;

    assert_eq!(report.status(), BatchStatus::Failed);
    assert_eq!(report.stored_names(), vec!["a.png"]);
    assert_eq!(report.failures(), vec![("b.png", "Bridge operation failed: quota exceeded")]);
    assert!(report
        .batch
        .error_message
        .as_deref()
        .unwrap()
        .contains("b.png"));

    assert_eq!(h.listing_names(), vec!["a.png"]);
    // A failed batch keeps its files queued for another attempt.
    assert_eq!(h.queue.len(), 2);
}

#[tokio::test]
async fn test_reconcile_falls_back_when_listing_fails() {
    let mut h = Harness::new(MemoryStore::default());
    h.store.seed("uploads/uid-1/old.png", b"old").await;
    h.refresh().await;
    h.store.list_unavailable.store(true, Ordering::SeqCst);

    h.select(vec![png("new.png", b"new")]);
    let report = h.upload(ConflictResolver::plan_all(h.queue.files())).await;

    assert_eq!(report.status(), BatchStatus::Succeeded);
    assert!(h.cache.is_stale());
    assert_eq!(h.listing_names(), vec!["new.png", "old.png"]);
    assert_eq!(
        h.cache.get("new.png").unwrap().url,
        "mem://uploads/uid-1/new.png"
    );
}

#[tokio::test]
async fn test_delete_many_reports_each_name() {
    let mut h = Harness::new(MemoryStore::default());
    h.store.seed("uploads/uid-1/a.png", b"a").await;
    h.store.seed("uploads/uid-1/b.png", b"b").await;
    h.refresh().await;

    let names = vec![
        "a.png".to_string(),
        "../../etc/passwd".to_string(),
        "b.png".to_string(),
        "ghost.png".to_string(),
    ];
    let report = h
        .coordinator
        .delete_many(&h.uid, &names, &mut h.cache)
        .await;

    assert_eq!(report.succeeded, vec!["a.png", "b.png", "ghost.png"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, "../../etc/passwd");
    assert!(h.cache.is_empty());
    assert!(h.store.keys().await.is_empty());
}

#[tokio::test]
async fn test_other_users_files_are_invisible() {
    let mut h = Harness::new(MemoryStore::default());
    h.store.seed("uploads/uid-2/secret.png", b"theirs").await;
    h.store.seed("uploads/uid-1/mine.png", b"mine").await;
    h.refresh().await;

    assert_eq!(h.listing_names(), vec!["mine.png"]);

    h.select(vec![png("secret.png", b"mine-too")]);
    let conflicts = h.resolver.detect_conflicts(h.queue.files(), h.cache.entries());
    assert!(conflicts.is_empty());

    let report = h.upload(ConflictResolver::plan_all(h.queue.files())).await;
    assert!(matches!(
        &report.outcomes[0],
        FileOutcome::Stored { handle, .. } if handle.key == "uploads/uid-1/secret.png"
    ));
    assert_eq!(
        h.store.content("uploads/uid-2/secret.png").await.unwrap(),
        Bytes::from_static(b"theirs")
    );
}
