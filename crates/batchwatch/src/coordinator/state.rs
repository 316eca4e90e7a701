//! Mutable coordinator state, only ever touched under the coordinator lock.

use std::collections::{BTreeSet, HashSet};

use super::cancel::BatchToken;
use crate::batch::{FileMetadata, JobRecordStore, PersistedBatch, SimulatedProgress};
use crate::broadcast::BatchSnapshot;

pub(crate) struct BatchState {
    pub batch_id: Option<String>,
    pub store: JobRecordStore,
    pub simulated: SimulatedProgress,
    /// Files with an upload task in flight.
    pub uploading: HashSet<String>,
    /// Files whose dependent upload succeeded.
    pub uploaded: BTreeSet<String>,
    pub metadata: Vec<FileMetadata>,
    pub is_connected: bool,
    pub is_complete: bool,
    pub has_error: bool,
    pub token: BatchToken,
    version: u64,
}

/// A snapshot taken under the lock, published after it is released.
pub(crate) struct Captured {
    pub version: u64,
    pub snapshot: BatchSnapshot,
}

impl BatchState {
    pub fn idle() -> Self {
        Self {
            batch_id: None,
            store: JobRecordStore::default(),
            simulated: SimulatedProgress::default(),
            uploading: HashSet::new(),
            uploaded: BTreeSet::new(),
            metadata: Vec::new(),
            is_connected: false,
            is_complete: false,
            has_error: false,
            token: BatchToken::new(),
            version: 0,
        }
    }

    pub fn started(
        batch_id: &str,
        store: JobRecordStore,
        metadata: Vec<FileMetadata>,
        token: BatchToken,
    ) -> Self {
        Self {
            batch_id: Some(batch_id.to_string()),
            store,
            metadata,
            token,
            ..Self::idle()
        }
    }

    pub fn restored(batch: PersistedBatch, token: BatchToken) -> Self {
        let store = JobRecordStore::from_jobs(batch.jobs);
        let simulated = SimulatedProgress::seeded_from(store.iter());
        Self {
            batch_id: Some(batch.batch_id),
            store,
            simulated,
            uploaded: batch.uploaded,
            metadata: batch.metadata,
            token,
            ..Self::idle()
        }
    }

    /// Replaces the state, keeping the snapshot version sequence.
    pub fn replace(&mut self, next: BatchState) {
        let version = self.version;
        *self = next;
        self.version = version;
    }

    /// A batch is active from start until completion or teardown.
    pub fn is_active(&self) -> bool {
        self.batch_id.is_some() && !self.is_complete && !self.has_error
    }

    /// Every job has finished its dependent upload.
    pub fn all_uploaded(&self) -> bool {
        self.uploaded.len() == self.store.len()
    }

    /// Reserves the upload of `file_name`. Returns false if an upload is
    /// already running or done.
    pub fn claim_upload(&mut self, file_name: &str) -> bool {
        if self.uploading.contains(file_name) || self.uploaded.contains(file_name) {
            return false;
        }
        self.uploading.insert(file_name.to_string());
        true
    }

    /// What to persist, or `None` when nothing should be stored.
    pub fn persisted(&self) -> Option<PersistedBatch> {
        if !self.is_active() {
            return None;
        }
        Some(PersistedBatch {
            batch_id: self.batch_id.clone()?,
            jobs: self.store.jobs(),
            uploaded: self.uploaded.clone(),
            metadata: self.metadata.clone(),
        })
    }

    pub fn snapshot(&self) -> BatchSnapshot {
        BatchSnapshot {
            batch_id: self.batch_id.clone(),
            jobs: self.store.jobs(),
            files: self.metadata.clone(),
            overall_progress: self.store.overall_progress(),
            is_connected: self.is_connected,
            is_complete: self.is_complete,
            has_error: self.has_error,
        }
    }

    /// Takes a versioned snapshot of the current state.
    pub fn capture(&mut self) -> Captured {
        self.version += 1;
        Captured {
            version: self.version,
            snapshot: self.snapshot(),
        }
    }
}
