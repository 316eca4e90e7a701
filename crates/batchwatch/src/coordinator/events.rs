//! Stream and simulator callbacks.

use std::sync::{Arc, Weak};

use async_trait::async_trait;

use super::cancel::BatchToken;
use super::Inner;
use crate::batch::{JobUpdate, UpdateOutcome};
use crate::error::StreamError;
use crate::stream::{StreamDirective, UpdateSink};

/// Connects one batch's stream consumer to the coordinator.
pub(super) struct StreamSink {
    inner: Weak<Inner>,
    token: BatchToken,
}

impl StreamSink {
    pub fn new(inner: Weak<Inner>, token: BatchToken) -> Self {
        Self { inner, token }
    }
}

#[async_trait]
impl UpdateSink for StreamSink {
    fn on_open(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.set_connected(&self.token, true);
        }
    }

    async fn on_updates(&self, updates: Vec<JobUpdate>) -> StreamDirective {
        match self.inner.upgrade() {
            Some(inner) => inner.apply_updates(&self.token, updates).await,
            None => StreamDirective::Close,
        }
    }

    fn on_error(&self, _error: &StreamError) {
        if let Some(inner) = self.inner.upgrade() {
            inner.set_connected(&self.token, false);
        }
    }
}

impl Inner {
    fn set_connected(&self, token: &BatchToken, connected: bool) {
        let captured = {
            let mut state = self.lock_state();
            if token.is_cancelled() || !state.is_active() || state.is_connected == connected {
                return;
            }
            state.is_connected = connected;
            state.capture()
        };
        self.publish(captured);
    }

    /// One simulator tick. Returns false once the batch is over.
    pub(super) fn on_tick(&self, token: &BatchToken) -> bool {
        let step = self.simulation.step;
        let ceiling = self.simulation.ceiling;
        let captured = {
            let mut guard = self.lock_state();
            if token.is_cancelled() || !guard.is_active() {
                return false;
            }
            let state = &mut *guard;
            if !state.store.simulate_tick(&mut state.simulated, step, ceiling) {
                return true;
            }
            self.save(state);
            state.capture()
        };
        self.publish(captured);
        true
    }

    /// Merges one batch-update event.
    pub(super) async fn apply_updates(
        self: &Arc<Self>,
        token: &BatchToken,
        updates: Vec<JobUpdate>,
    ) -> StreamDirective {
        let mut dispatch = Vec::new();
        let mut failure: Option<(String, String)> = None;

        let (captured, all_finished) = {
            let mut guard = self.lock_state();
            if token.is_cancelled() || !guard.is_active() {
                return StreamDirective::Continue;
            }
            let state = &mut *guard;

            for update in &updates {
                match state.store.apply_update(update, &mut state.simulated) {
                    UpdateOutcome::Completed => {
                        if state.claim_upload(&update.file_name) {
                            dispatch.push(update.file_name.clone());
                        }
                    }
                    UpdateOutcome::Failed { error } => {
                        log::warn!("Server reported '{}' as failed: {}", update.file_name, error);
                        if failure.is_none() {
                            failure = Some((update.file_name.clone(), error));
                        }
                    }
                    UpdateOutcome::UnknownFile
                    | UpdateOutcome::Ignored
                    | UpdateOutcome::Progressed { .. } => {}
                }
            }

            let all_finished = failure.is_none() && state.store.all_server_terminal();
            if all_finished {
                state.is_connected = false;
            }
            self.save(state);
            (state.capture(), all_finished)
        };
        self.publish(captured);

        if let Some((file_name, error)) = failure {
            self.fail_batch(token, &format!("'{}' failed: {}", file_name, error))
                .await;
            return StreamDirective::Continue;
        }

        if all_finished {
            self.simulator.stop();
        }
        self.dispatch(token, dispatch);

        if all_finished {
            StreamDirective::Close
        } else {
            StreamDirective::Continue
        }
    }
}
