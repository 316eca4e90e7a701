//! Durable mirror of the current batch in the key-value store.

use std::collections::BTreeSet;

use super::job::{BatchJob, FileMetadata, JobStatus};
use crate::db::{kv_repo, Database, DatabaseError};

const KEY_BATCH_ID: &str = "batchwatch.batch_id";
const KEY_JOBS: &str = "batchwatch.jobs";
const KEY_UPLOADED: &str = "batchwatch.uploaded_files";
const KEY_METADATA: &str = "batchwatch.file_metadata";

/// Everything needed to resume a batch after a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedBatch {
    pub batch_id: String,
    pub jobs: Vec<BatchJob>,
    pub uploaded: BTreeSet<String>,
    pub metadata: Vec<FileMetadata>,
}

impl PersistedBatch {
    /// True when every job has been uploaded.
    pub fn is_complete(&self) -> bool {
        self.jobs.iter().all(|j| self.uploaded.contains(&j.file_name))
    }

    /// Jobs the server finished that still need their upload.
    pub fn pending_uploads(&self) -> Vec<String> {
        self.jobs
            .iter()
            .filter(|j| !self.uploaded.contains(&j.file_name))
            .filter(|j| matches!(j.status, JobStatus::Completed | JobStatus::Uploading))
            .map(|j| j.file_name.clone())
            .collect()
    }
}

/// Reads and writes the batch snapshot under four stable keys.
#[derive(Clone)]
pub struct BatchPersistence {
    db: Database,
}

impl BatchPersistence {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Writes a full snapshot, replacing whatever was stored. The four keys
    /// change together or not at all.
    pub fn save(&self, batch: &PersistedBatch) -> Result<(), DatabaseError> {
        let entries = [
            (KEY_BATCH_ID, batch.batch_id.clone()),
            (KEY_JOBS, kv_repo::encode(KEY_JOBS, &batch.jobs)?),
            (KEY_UPLOADED, kv_repo::encode(KEY_UPLOADED, &batch.uploaded)?),
            (KEY_METADATA, kv_repo::encode(KEY_METADATA, &batch.metadata)?),
        ];
        kv_repo::put_many_raw(&self.db, &entries)
    }

    /// Loads the stored batch, if any.
    ///
    /// A batch id without job records loads as an empty batch.
    pub fn load(&self) -> Result<Option<PersistedBatch>, DatabaseError> {
        let Some(batch_id) = kv_repo::get_raw(&self.db, KEY_BATCH_ID)? else {
            return Ok(None);
        };
        if batch_id.is_empty() {
            return Ok(None);
        }

        Ok(Some(PersistedBatch {
            batch_id,
            jobs: kv_repo::get(&self.db, KEY_JOBS)?.unwrap_or_default(),
            uploaded: kv_repo::get(&self.db, KEY_UPLOADED)?.unwrap_or_default(),
            metadata: kv_repo::get(&self.db, KEY_METADATA)?.unwrap_or_default(),
        }))
    }

    /// Removes every stored record of the batch.
    pub fn clear(&self) -> Result<(), DatabaseError> {
        kv_repo::delete_many(
            &self.db,
            &[KEY_BATCH_ID, KEY_JOBS, KEY_UPLOADED, KEY_METADATA],
        )
    }
}
