//! Test harness for isolated coordinator runs.
//!
//! Every harness owns its own database, blob store and event source, so
//! tests never touch the user's real state.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::{broadcast, Semaphore};

use batchwatch::db::Database;
use batchwatch::{
    BatchCoordinator, BatchSnapshot, BlobStore, ChannelEventSource, CoordinatorConfig,
    DocumentUploader, FileMetadata, JobUpdate, MemoryBlobStore, Notice, StoredFile, UploadError,
};

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Uploader recording every file it receives.
///
/// Can be told to reject uploads, or to hold each upload until the test
/// releases it.
#[derive(Clone, Default)]
pub struct RecordingUploader {
    uploaded: Arc<Mutex<Vec<StoredFile>>>,
    started: Arc<AtomicUsize>,
    reject_with: Option<String>,
    gate: Option<Arc<Semaphore>>,
}

impl RecordingUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploader failing every call with `reason`.
    pub fn rejecting(reason: &str) -> Self {
        Self {
            reject_with: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Uploader waiting for [`release`](Self::release) before each upload.
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn release(&self, uploads: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(uploads);
        }
    }

    /// Waits until `count` upload calls have begun.
    pub async fn wait_started(&self, count: usize) {
        let started = Arc::clone(&self.started);
        tokio::time::timeout(WAIT_TIMEOUT, async move {
            while started.load(Ordering::SeqCst) < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for uploads to start");
    }

    pub fn names(&self) -> Vec<String> {
        self.uploaded
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn files(&self) -> Vec<StoredFile> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DocumentUploader for RecordingUploader {
    async fn upload(&self, file: StoredFile) -> Result<(), UploadError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| UploadError::Rejected(e.to_string()))?
                .forget();
        }
        if let Some(reason) = &self.reject_with {
            return Err(UploadError::Rejected(reason.clone()));
        }
        self.uploaded.lock().unwrap().push(file);
        Ok(())
    }
}

/// Isolated environment for one coordinator (or a sequence of them sharing
/// the same storage, to simulate a reload).
pub struct TestHarness {
    temp_dir: TempDir,
    pub database: Database,
    pub blobs: Arc<MemoryBlobStore>,
    pub events: ChannelEventSource,
    pub config: CoordinatorConfig,
    /// Repository directory for `DirectoryUploader` tests.
    pub repository: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let repository = temp_dir.path().join("repository");

        let mut config = CoordinatorConfig::new("http://localhost:8080");
        config.storage.database_path = temp_dir.path().join("batchwatch.db");
        config.storage.blob_directory = temp_dir.path().join("blobs");
        config.simulation.tick_interval_ms = 50;

        Self {
            temp_dir,
            database: Database::open_in_memory().expect("Failed to open database"),
            blobs: Arc::new(MemoryBlobStore::new()),
            events: ChannelEventSource::new(),
            config,
            repository,
        }
    }

    /// Builds a coordinator over this harness' storage. Restores whatever
    /// an earlier coordinator persisted.
    pub fn coordinator(&self) -> BatchCoordinator {
        BatchCoordinator::new(
            &self.config,
            self.database.clone(),
            Arc::clone(&self.blobs) as Arc<dyn BlobStore>,
            Arc::new(self.events.clone()),
        )
    }

    /// Stores one blob per name, with the name as content.
    pub async fn store_files(&self, names: &[&str]) -> Vec<FileMetadata> {
        let mut metadata = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let file = StoredFile::new(name, name.as_bytes().to_vec());
            metadata.push(FileMetadata::new(&format!("f-{}", i), name, file.size()));
            self.blobs.put_file(file).await.expect("Failed to store blob");
        }
        metadata
    }

    /// Stores the files and starts a batch over them, waiting until the
    /// event stream is open.
    pub async fn start(&self, coordinator: &BatchCoordinator, batch_id: &str, names: &[&str]) {
        let metadata = self.store_files(names).await;
        coordinator
            .start_batch(batch_id, names, metadata)
            .await
            .expect("Failed to start batch");
        wait_for(coordinator, |s| s.is_connected).await;
    }

    /// Pushes one batch-update event.
    pub fn push(&self, updates: &[JobUpdate]) {
        assert!(
            self.events.send_updates(updates),
            "no open event stream to push to"
        );
    }
}

/// Waits until the published state satisfies `predicate`.
pub async fn wait_for<F>(coordinator: &BatchCoordinator, predicate: F) -> BatchSnapshot
where
    F: Fn(&BatchSnapshot) -> bool,
{
    let mut rx = coordinator.watch();
    let result = tokio::time::timeout(WAIT_TIMEOUT, rx.wait_for(|s| predicate(s))).await;
    match result {
        Ok(Ok(snapshot)) => snapshot.clone(),
        Ok(Err(_)) => panic!("state channel closed"),
        Err(_) => panic!(
            "timed out waiting for state, last seen: {:?}",
            coordinator.state()
        ),
    }
}

/// Polls `condition` until it holds, failing the test after a timeout.
pub async fn wait_until<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let result = tokio::time::timeout(WAIT_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if result.is_err() {
        panic!("timed out waiting until {}", what);
    }
}

/// Receives the next notice, failing the test after a timeout.
pub async fn next_notice(notices: &mut broadcast::Receiver<Notice>) -> Notice {
    tokio::time::timeout(WAIT_TIMEOUT, notices.recv())
        .await
        .expect("timed out waiting for notice")
        .expect("notice channel closed")
}
