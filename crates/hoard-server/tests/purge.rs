//! Deletion queue tests
//!
//! The worker runs against the in-memory store and either a blob store held
//! in memory (to inject failures) or real files in a temporary directory.

use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hoard_core::{FileRecord, FileStore, MemoryStore, UserRecord, UserStatus};
use hoard_server::purge::{self, PurgeReply, PurgeRequest};
use hoard_server::{BlobStore, FsBlobStore, PurgeConfig, PurgeError, PurgeHandle};

// =============================================================================
// Test Helpers
// =============================================================================

/// Blobs held in memory; names in `fail_once` error on their first removal,
/// names in `always_fail` on every removal
#[derive(Debug, Default)]
struct MemoryBlobs {
    blobs: Mutex<HashSet<String>>,
    fail_once: Mutex<HashSet<String>>,
    always_fail: HashSet<String>,
}

impl MemoryBlobs {
    fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn remove(&self, name: &str) -> io::Result<bool> {
        if self.always_fail.contains(name) || self.fail_once.lock().unwrap().remove(name) {
            return Err(io::Error::new(io::ErrorKind::Other, "disk unavailable"));
        }
        Ok(self.blobs.lock().unwrap().remove(name))
    }
}

fn seed(store: &MemoryStore, blobs: &MemoryBlobs, owner: &str, count: usize) {
    for i in 0..count {
        let blob = format!("{}-{:04}.bin", owner, i);
        store.insert_file(FileRecord::new(format!("{}-f{:04}", owner, i), owner, &blob));
        blobs.blobs.lock().unwrap().insert(blob);
    }
}

fn small_pages() -> PurgeConfig {
    PurgeConfig {
        page_size: 7,
        ..PurgeConfig::default()
    }
}

/// Poll `check` until the worker reports idle
async fn wait_idle(handle: &PurgeHandle) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while handle.check().await.unwrap() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("deletion worker did not become idle");
}

// =============================================================================
// SCENARIO D: Drain With a Transient Failure
// =============================================================================

#[tokio::test]
async fn purge_drains_both_subjects_despite_one_failure() {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobs::default());
    seed(&store, &blobs, "u1", 30);
    seed(&store, &blobs, "u2", 12);
    blobs.fail_once.lock().unwrap().insert("u1-0003.bin".into());

    let (handle, task) = PurgeHandle::spawn(store.clone(), blobs.clone(), small_pages());
    handle.enqueue("u1").await.unwrap();
    handle.enqueue("u2").await.unwrap();
    wait_idle(&handle).await;

    assert_eq!(store.count_files("u1").await.unwrap(), 0);
    assert_eq!(store.count_files("u2").await.unwrap(), 0);
    assert_eq!(blobs.len(), 0);
    assert!(!handle.check().await.unwrap());

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn purge_leaves_other_owners_alone() {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobs::default());
    seed(&store, &blobs, "u1", 10);
    seed(&store, &blobs, "keep", 4);

    let (handle, _task) = PurgeHandle::spawn(store.clone(), blobs.clone(), small_pages());
    handle.enqueue("u1").await.unwrap();
    wait_idle(&handle).await;

    assert_eq!(store.count_files("u1").await.unwrap(), 0);
    assert_eq!(store.count_files("keep").await.unwrap(), 4);
    assert_eq!(blobs.len(), 4);
}

#[tokio::test]
async fn missing_blob_counts_as_removed() {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobs::default());
    store.insert_file(FileRecord::new("orphan", "u1", "never-written.bin"));

    let (handle, _task) = PurgeHandle::spawn(store.clone(), blobs, PurgeConfig::default());
    handle.enqueue("u1").await.unwrap();
    wait_idle(&handle).await;

    assert_eq!(store.count_files("u1").await.unwrap(), 0);
}

#[tokio::test]
async fn stalled_subject_is_dropped() {
    let store = Arc::new(MemoryStore::new());
    let mut blobs = MemoryBlobs::default();
    seed(&store, &blobs, "stuck", 3);
    seed(&store, &blobs, "u2", 5);
    blobs.always_fail = (0..3).map(|i| format!("stuck-{:04}.bin", i)).collect();
    let blobs = Arc::new(blobs);

    let (handle, _task) = PurgeHandle::spawn(store.clone(), blobs.clone(), small_pages());
    handle.enqueue("stuck").await.unwrap();
    handle.enqueue("u2").await.unwrap();
    wait_idle(&handle).await;

    // the worker gave up on "stuck" but still finished "u2"
    assert_eq!(store.count_files("stuck").await.unwrap(), 3);
    assert_eq!(store.count_files("u2").await.unwrap(), 0);
}

/// Files that keep failing fill a whole page; the files behind them must
/// still be reached
#[tokio::test]
async fn failing_page_does_not_hide_later_files() {
    let store = Arc::new(MemoryStore::new());
    let mut blobs = MemoryBlobs::default();
    for id in ["a0", "a1", "b0", "b1", "b2"] {
        let blob = format!("{}.bin", id);
        store.insert_file(FileRecord::new(id, "u1", &blob));
        blobs.blobs.lock().unwrap().insert(blob);
    }
    blobs.always_fail = ["a0.bin", "a1.bin"].iter().map(|b| b.to_string()).collect();
    let blobs = Arc::new(blobs);

    let config = PurgeConfig {
        page_size: 2,
        ..PurgeConfig::default()
    };
    let (handle, _task) = PurgeHandle::spawn(store.clone(), blobs.clone(), config);
    handle.enqueue("u1").await.unwrap();
    wait_idle(&handle).await;

    let left: Vec<String> = store
        .files_page("u1", 10, None)
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.id)
        .collect();
    assert_eq!(left, vec!["a0", "a1"]);
    assert_eq!(blobs.len(), 2);
}

#[tokio::test]
async fn enqueue_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobs::default());
    seed(&store, &blobs, "u1", 20);

    let (handle, _task) = PurgeHandle::spawn(store.clone(), blobs.clone(), small_pages());
    for _ in 0..5 {
        handle.enqueue("u1").await.unwrap();
    }
    wait_idle(&handle).await;

    assert_eq!(store.count_files("u1").await.unwrap(), 0);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn idle_worker_reports_inactive() {
    let store = Arc::new(MemoryStore::new());
    let (handle, _task) =
        PurgeHandle::spawn(store, Arc::new(MemoryBlobs::default()), PurgeConfig::default());

    assert!(!handle.check().await.unwrap());
}

#[tokio::test]
async fn shutdown_stops_the_worker() {
    let store = Arc::new(MemoryStore::new());
    let (handle, task) =
        PurgeHandle::spawn(store, Arc::new(MemoryBlobs::default()), PurgeConfig::default());

    handle.shutdown().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("worker did not stop")
        .unwrap();

    assert!(matches!(handle.check().await, Err(PurgeError::QueueClosed)));
    assert!(matches!(handle.enqueue("u1").await, Err(PurgeError::QueueClosed)));
}

#[tokio::test]
async fn dispatch_speaks_the_wire_protocol() {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobs::default());
    seed(&store, &blobs, "u1", 3);
    let (handle, task) = PurgeHandle::spawn(store.clone(), blobs, PurgeConfig::default());

    let request: PurgeRequest = serde_json::from_str(r#"{"op":"add","subject":"u1"}"#).unwrap();
    assert_eq!(
        handle.dispatch(request).await.unwrap(),
        PurgeReply::Queued { queued: true }
    );
    wait_idle(&handle).await;

    let reply = handle.dispatch(PurgeRequest::Check).await.unwrap();
    assert_eq!(serde_json::to_value(&reply).unwrap(), serde_json::json!({"active": false}));

    let reply = handle.dispatch(PurgeRequest::Shutdown).await.unwrap();
    assert_eq!(serde_json::to_value(&reply).unwrap(), serde_json::json!({"done": true}));
    task.await.unwrap();
}

#[tokio::test]
async fn restart_recovery_resumes_removed_accounts() {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobs::default());

    let mut banned = UserRecord::new("banned", "mallory");
    banned.status = UserStatus::Banned;
    let mut deleted = UserRecord::new("deleted", "bob");
    deleted.status = UserStatus::Deleted;
    store.insert_user(banned);
    store.insert_user(deleted);
    store.insert_user(UserRecord::new("active", "alice"));

    seed(&store, &blobs, "banned", 9);
    seed(&store, &blobs, "deleted", 2);
    seed(&store, &blobs, "active", 3);

    let (handle, _task) = PurgeHandle::spawn(store.clone(), blobs.clone(), small_pages());
    let queued = purge::recover_pending(store.as_ref(), &handle).await.unwrap();
    assert_eq!(queued, 2);
    wait_idle(&handle).await;

    assert_eq!(store.count_files("banned").await.unwrap(), 0);
    assert_eq!(store.count_files("deleted").await.unwrap(), 0);
    assert_eq!(store.count_files("active").await.unwrap(), 3);
    assert!(store.subjects_pending_purge().await.unwrap().is_empty());
}

// =============================================================================
// Filesystem Blobs
// =============================================================================

#[tokio::test]
async fn purge_removes_files_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    for i in 0..4 {
        let name = format!("blob-{}", i);
        std::fs::write(dir.path().join(&name), b"data").unwrap();
        store.insert_file(FileRecord::new(format!("f{}", i), "u1", name));
    }
    std::fs::write(dir.path().join("other"), b"keep").unwrap();

    let blobs = Arc::new(FsBlobStore::new(dir.path()));
    let (handle, _task) = PurgeHandle::spawn(store.clone(), blobs, small_pages());
    handle.enqueue("u1").await.unwrap();
    wait_idle(&handle).await;

    assert_eq!(store.count_files("u1").await.unwrap(), 0);
    for i in 0..4 {
        assert!(!dir.path().join(format!("blob-{}", i)).exists());
    }
    assert!(dir.path().join("other").exists());
}
