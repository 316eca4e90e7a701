//! In-process event source.
//!
//! Lets an embedding application (or a test) push batch updates without an
//! HTTP server. Each `connect` opens a fresh channel and replaces the
//! previous one.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use tokio::sync::mpsc;

use super::{EventSource, EventStream, StreamTarget};
use crate::batch::JobUpdate;
use crate::error::StreamError;

type Item = Result<String, StreamError>;

#[derive(Default)]
struct ChannelState {
    sender: Option<mpsc::UnboundedSender<Item>>,
    targets: Vec<StreamTarget>,
    refuse_with: Option<StreamError>,
}

/// [`EventSource`] fed through method calls.
#[derive(Clone, Default)]
pub struct ChannelEventSource {
    state: Arc<Mutex<ChannelState>>,
}

impl ChannelEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Channel source lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn push(&self, item: Item) -> bool {
        match &self.lock().sender {
            Some(sender) => sender.send(item).is_ok(),
            None => false,
        }
    }

    /// Sends a raw payload. Returns false if no connection is open.
    pub fn send(&self, payload: impl Into<String>) -> bool {
        self.push(Ok(payload.into()))
    }

    /// Sends update records as one JSON array payload.
    pub fn send_updates(&self, updates: &[JobUpdate]) -> bool {
        match serde_json::to_string(updates) {
            Ok(payload) => self.send(payload),
            Err(e) => {
                log::error!("Failed to encode batch updates: {}", e);
                false
            }
        }
    }

    /// Delivers a transport error on the open connection.
    pub fn fail(&self, error: StreamError) -> bool {
        self.push(Err(error))
    }

    /// Ends the open connection from the server side.
    pub fn close(&self) {
        self.lock().sender = None;
    }

    /// Makes every following `connect` fail with `error` (or succeed again
    /// with `None`).
    pub fn refuse_connections(&self, error: Option<StreamError>) {
        self.lock().refuse_with = error;
    }

    /// True while a consumer holds the open connection.
    pub fn is_connected(&self) -> bool {
        self.lock()
            .sender
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }

    /// Number of `connect` calls so far, refused ones included.
    pub fn connect_count(&self) -> usize {
        self.lock().targets.len()
    }

    pub fn last_target(&self) -> Option<StreamTarget> {
        self.lock().targets.last().cloned()
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    async fn connect(&self, target: &StreamTarget) -> Result<EventStream, StreamError> {
        let mut state = self.lock();
        state.targets.push(target.clone());
        if let Some(error) = &state.refuse_with {
            return Err(error.clone());
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        state.sender = Some(sender);
        log::debug!("Channel event source connected for batch {}", target.batch_id);

        Ok(stream::unfold(receiver, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}
