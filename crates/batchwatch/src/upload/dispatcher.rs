//! One upload task per processed file.
//!
//! The task suspends on the blob lookup and on the upload call. Every state
//! change goes through an [`UploadLedger`], which re-checks the batch token
//! under its own lock, so work of an abandoned batch never lands.

use std::sync::Arc;

use async_trait::async_trait;

use super::blob_store::BlobStore;
use super::uploader::DocumentUploader;
use crate::coordinator::cancel::{BatchToken, Checkpoint};
use crate::error::UploadError;

/// State owner an upload task reports to.
#[async_trait]
pub trait UploadLedger: Send + Sync + 'static {
    /// The original bytes of `file_name` are gone.
    fn mark_missing(&self, token: &BatchToken, file_name: &str);

    /// Moves the job to `uploading`. Returns false if the task must stop.
    fn mark_uploading(&self, token: &BatchToken, file_name: &str) -> bool;

    /// The uploader to use. When none is configured the job gives up its
    /// claim and waits for one.
    fn uploader_for(&self, token: &BatchToken, file_name: &str)
        -> Option<Arc<dyn DocumentUploader>>;

    async fn record_uploaded(&self, token: &BatchToken, file_name: &str);

    async fn record_failure(&self, token: &BatchToken, file_name: &str, error: &UploadError);
}

/// Everything one upload task needs.
pub struct UploadJob {
    pub file_name: String,
    pub token: BatchToken,
    pub blobs: Arc<dyn BlobStore>,
}

/// Spawns the upload task for one file. Fire and forget.
pub fn spawn_upload(job: UploadJob, ledger: Arc<dyn UploadLedger>) {
    tokio::spawn(async move {
        run_upload(job, ledger.as_ref()).await;
    });
}

/// Runs the upload steps for one file.
pub async fn run_upload(job: UploadJob, ledger: &dyn UploadLedger) {
    let UploadJob {
        file_name,
        token,
        blobs,
    } = job;

    if !token.check(Checkpoint::BeforeLookup) {
        return;
    }

    let file = match blobs.get_file(&file_name).await {
        Ok(Some(file)) => file,
        Ok(None) => {
            ledger.mark_missing(&token, &file_name);
            return;
        }
        Err(e) => {
            log::error!("Blob lookup for '{}' failed: {}", file_name, e);
            ledger.mark_missing(&token, &file_name);
            return;
        }
    };

    let Some(uploader) = ledger.uploader_for(&token, &file_name) else {
        return;
    };

    if !ledger.mark_uploading(&token, &file_name) {
        return;
    }

    if !token.check(Checkpoint::BeforeUpload) {
        return;
    }

    log::debug!("Uploading '{}' ({} bytes)", file_name, file.size());
    let result = uploader.upload(file).await;

    if !token.check(Checkpoint::AfterUpload) {
        return;
    }

    match result {
        Ok(()) => ledger.record_uploaded(&token, &file_name).await,
        Err(e) => ledger.record_failure(&token, &file_name, &e).await,
    }
}
