//! Upload task bookkeeping.

use std::sync::Arc;

use async_trait::async_trait;

use super::cancel::BatchToken;
use super::Inner;
use crate::batch::JobStatus;
use crate::broadcast::Notice;
use crate::error::UploadError;
use crate::upload::{spawn_upload, DocumentUploader, UploadJob, UploadLedger};

const MISSING_FILE_ERROR: &str = "Original file is no longer available locally";

impl Inner {
    /// Spawns one upload task per claimed file.
    pub(super) fn dispatch(self: &Arc<Self>, token: &BatchToken, file_names: Vec<String>) {
        if file_names.is_empty() {
            return;
        }
        for file_name in file_names {
            log::debug!("Dispatching upload of '{}'", file_name);
            let job = UploadJob {
                file_name,
                token: token.clone(),
                blobs: Arc::clone(&self.blobs),
            };
            spawn_upload(job, Arc::clone(self) as Arc<dyn UploadLedger>);
        }
    }
}

#[async_trait]
impl UploadLedger for Inner {
    fn mark_missing(&self, token: &BatchToken, file_name: &str) {
        let (captured, batch_id) = {
            let mut state = self.lock_state();
            if token.is_cancelled() || !state.is_active() {
                return;
            }
            state.uploading.remove(file_name);
            state.simulated.stop(file_name);
            let Some(job) = state.store.get_mut(file_name) else {
                return;
            };
            job.status = JobStatus::Error;
            job.error = Some(MISSING_FILE_ERROR.to_string());
            self.save(&state);
            (state.capture(), state.batch_id.clone())
        };
        self.publish(captured);
        self.notices
            .send(Notice::missing_file(batch_id.as_deref(), file_name));
    }

    fn mark_uploading(&self, token: &BatchToken, file_name: &str) -> bool {
        let captured = {
            let mut state = self.lock_state();
            if token.is_cancelled() || !state.is_active() {
                return false;
            }
            let Some(job) = state.store.get_mut(file_name) else {
                return false;
            };
            job.status = JobStatus::Uploading;
            self.save(&state);
            state.capture()
        };
        self.publish(captured);
        true
    }

    fn uploader_for(
        &self,
        token: &BatchToken,
        file_name: &str,
    ) -> Option<Arc<dyn DocumentUploader>> {
        // Checked under the state lock so a concurrent `set_uploader` either
        // is seen here or sees the released claim.
        let mut state = self.lock_state();
        if token.is_cancelled() {
            return None;
        }
        let uploader = self.current_uploader();
        if uploader.is_none() {
            state.uploading.remove(file_name);
            log::warn!(
                "No uploader configured; '{}' waits until one is set",
                file_name
            );
        }
        uploader
    }

    async fn record_uploaded(&self, token: &BatchToken, file_name: &str) {
        let (captured, done, uploaded, total) = {
            let mut state = self.lock_state();
            if token.is_cancelled() || !state.is_active() {
                return;
            }
            state.uploading.remove(file_name);
            let Some(job) = state.store.get_mut(file_name) else {
                return;
            };
            job.mark_completed();
            state.uploaded.insert(file_name.to_string());
            self.save(&state);
            let (uploaded, total) = (state.uploaded.len(), state.store.len());
            (state.capture(), state.all_uploaded(), uploaded, total)
        };
        self.publish(captured);
        log::info!("Uploaded '{}' ({}/{})", file_name, uploaded, total);

        if done {
            self.complete_batch(token).await;
        }
    }

    async fn record_failure(&self, token: &BatchToken, file_name: &str, error: &UploadError) {
        let batch_id = {
            let state = self.lock_state();
            if token.is_cancelled() || !state.is_active() {
                return;
            }
            state.batch_id.clone()
        };
        self.notices.send(Notice::upload_failed(
            batch_id.as_deref(),
            file_name,
            &error.to_string(),
        ));
        self.fail_batch(token, &format!("upload of '{}' failed: {}", file_name, error))
            .await;
    }
}
