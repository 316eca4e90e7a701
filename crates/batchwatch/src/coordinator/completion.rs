//! Terminal transitions of a batch: completion, forced cleanup, reset.
//!
//! Completion and failure exclude each other; whichever runs first wins.

use super::cancel::BatchToken;
use super::state::BatchState;
use super::Inner;
use crate::broadcast::Notice;

impl Inner {
    /// Declares the batch complete once every file is uploaded.
    pub(super) async fn complete_batch(&self, token: &BatchToken) {
        let (captured, batch_id, files) = {
            let mut state = self.lock_state();
            if token.is_cancelled() || !state.is_active() || !state.all_uploaded() {
                return;
            }
            state.is_complete = true;
            state.is_connected = false;
            state.simulated.clear();
            state.uploading.clear();
            self.clear_persisted();
            (state.capture(), state.batch_id.clone(), state.store.len())
        };
        self.stop_background();
        self.publish(captured);
        self.clear_blobs().await;

        log::info!(
            "Batch {} complete: {} file(s) processed and uploaded",
            batch_id.as_deref().unwrap_or("-"),
            files
        );
        self.notices
            .send(Notice::batch_completed(batch_id.as_deref(), files));
    }

    /// Forced cleanup after an unrecoverable failure.
    ///
    /// Jobs stay in memory for display; the batch id, persisted state and
    /// stored blobs are dropped.
    pub(super) async fn fail_batch(&self, token: &BatchToken, reason: &str) {
        let (captured, batch_id) = {
            let mut state = self.lock_state();
            if token.is_cancelled() || !state.is_active() {
                return;
            }
            token.cancel();
            let batch_id = state.batch_id.take();
            state.has_error = true;
            state.is_connected = false;
            state.simulated.clear();
            state.uploading.clear();
            self.clear_persisted();
            (state.capture(), batch_id)
        };
        self.stop_background();
        self.publish(captured);
        self.clear_blobs().await;

        log::error!(
            "Batch {} failed: {}",
            batch_id.as_deref().unwrap_or("-"),
            reason
        );
        self.notices
            .send(Notice::batch_failed(batch_id.as_deref(), reason));
    }

    /// Abandons whatever batch is tracked and returns to idle.
    pub(super) async fn reset(&self) {
        let (captured, batch_id) = {
            let mut state = self.lock_state();
            state.token.cancel();
            let batch_id = state.batch_id.take();
            state.replace(BatchState::idle());
            self.clear_persisted();
            (state.capture(), batch_id)
        };
        self.stop_background();
        self.publish(captured);
        self.clear_blobs().await;

        if let Some(batch_id) = batch_id {
            log::info!("Cleaned up batch {}", batch_id);
        }
    }
}
