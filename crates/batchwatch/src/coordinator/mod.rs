//! The batch coordinator: owns the job store and drives the simulator, the
//! event stream, the upload tasks and the terminal transitions of a batch.
//!
//! All state sits behind one mutex. Critical sections are short and
//! synchronous; nothing is awaited and no listener runs while the lock is
//! held. Snapshots are captured under the lock and published after it.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock};

use tokio::sync::{broadcast, watch};

use crate::batch::{
    BatchPersistence, FileMetadata, JobRecordStore, JobStatus, ProgressSimulator,
};
use crate::broadcast::{BatchSnapshot, Notice, NoticeBroadcaster, StateBroadcaster, Subscription};
use crate::config::{CoordinatorConfig, SimulationConfig};
use crate::db::Database;
use crate::error::{BatchError, Result};
use crate::stream::{EventSource, EventStreamConsumer, SseEventSource, StreamTarget};
use crate::task::BackgroundTask;
use crate::upload::{BlobStore, DocumentUploader, FsBlobStore};

pub mod cancel;
mod completion;
mod events;
mod state;
mod uploads;

pub use cancel::{BatchToken, Checkpoint};

use events::StreamSink;
use state::{BatchState, Captured};

static GLOBAL: OnceLock<BatchCoordinator> = OnceLock::new();

pub(crate) struct Inner {
    state: Mutex<BatchState>,
    persistence: BatchPersistence,
    blobs: Arc<dyn BlobStore>,
    stream: EventStreamConsumer,
    user_id: Option<String>,
    simulation: SimulationConfig,
    simulator: ProgressSimulator,
    stream_task: Mutex<Option<BackgroundTask>>,
    uploader: RwLock<Option<Arc<dyn DocumentUploader>>>,
    states: StateBroadcaster,
    notices: NoticeBroadcaster,
}

/// Handle to the coordinator. Clones share the same coordinator.
#[derive(Clone)]
pub struct BatchCoordinator {
    inner: Arc<Inner>,
}

impl BatchCoordinator {
    /// Creates a coordinator and resumes any batch persisted in `database`.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(
        config: &CoordinatorConfig,
        database: Database,
        blobs: Arc<dyn BlobStore>,
        events: Arc<dyn EventSource>,
    ) -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(BatchState::idle()),
            persistence: BatchPersistence::new(database),
            blobs,
            stream: EventStreamConsumer::new(events, config.event_stream.reconnect.clone()),
            user_id: config.event_stream.user_id.clone(),
            simulation: config.simulation.clone(),
            simulator: ProgressSimulator::new(config.simulation.tick_interval()),
            stream_task: Mutex::new(None),
            uploader: RwLock::new(None),
            states: StateBroadcaster::default(),
            notices: NoticeBroadcaster::new(config.notifications.capacity),
        });
        inner.restore();
        Self { inner }
    }

    /// Creates a coordinator with the SQLite store, directory blob store and
    /// SSE source named in `config`.
    pub fn from_config(config: &CoordinatorConfig) -> Result<Self> {
        let database = Database::open(&config.storage.database_path)?;
        let events = SseEventSource::new(&config.event_stream.base_url)?;
        let blobs = FsBlobStore::new(&config.storage.blob_directory);
        Ok(Self::new(config, database, Arc::new(blobs), Arc::new(events)))
    }

    /// Installs the process-wide coordinator. Fails, returning it, if one is
    /// already installed.
    pub fn install(coordinator: BatchCoordinator) -> std::result::Result<(), BatchCoordinator> {
        GLOBAL.set(coordinator)
    }

    /// The process-wide coordinator, if installed.
    pub fn global() -> Option<&'static BatchCoordinator> {
        GLOBAL.get()
    }

    /// The process-wide coordinator, created with `init` on first use.
    pub fn global_or_init<F>(init: F) -> &'static BatchCoordinator
    where
        F: FnOnce() -> BatchCoordinator,
    {
        GLOBAL.get_or_init(init)
    }

    /// Starts tracking a new batch with every file pending at zero.
    ///
    /// Any previous batch is abandoned: its upload tasks stop at their next
    /// checkpoint and its stream and simulator are stopped.
    pub async fn start_batch<S: AsRef<str>>(
        &self,
        batch_id: &str,
        file_names: &[S],
        metadata: Vec<FileMetadata>,
    ) -> Result<()> {
        if batch_id.trim().is_empty() {
            return Err(BatchError::EmptyBatchId);
        }
        let store = JobRecordStore::from_file_names(file_names)?;
        let inner = &self.inner;
        let token = BatchToken::new();

        let (captured, files) = {
            let mut state = inner.lock_state();
            state.token.cancel();
            state.replace(BatchState::started(batch_id, store, metadata, token.clone()));
            inner.save(&state);
            (state.capture(), state.store.len())
        };
        inner.stop_background();
        inner.publish(captured);
        log::info!("Started batch {} with {} file(s)", batch_id, files);

        if files == 0 {
            inner.complete_batch(&token).await;
            return Ok(());
        }
        inner.start_background(batch_id, &token);
        Ok(())
    }

    /// Sets the function performing the dependent upload and dispatches
    /// every processed file that was waiting for it.
    pub fn set_uploader<U>(&self, uploader: U)
    where
        U: DocumentUploader + 'static,
    {
        let inner = &self.inner;
        {
            let mut slot = match inner.uploader.write() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            *slot = Some(Arc::new(uploader));
        }

        let (token, pending) = {
            let mut state = inner.lock_state();
            if !state.is_active() {
                return;
            }
            let waiting: Vec<String> = state
                .store
                .iter()
                .filter(|j| j.status == JobStatus::Completed)
                .map(|j| j.file_name.clone())
                .collect();
            let claimed: Vec<String> = waiting
                .into_iter()
                .filter(|name| state.claim_upload(name))
                .collect();
            (state.token.clone(), claimed)
        };
        if !pending.is_empty() {
            log::info!("Dispatching {} deferred upload(s)", pending.len());
        }
        inner.dispatch(&token, pending);
    }

    /// Registers a listener called now with the current state and again on
    /// every change.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&BatchSnapshot) + Send + Sync + 'static,
    {
        self.inner.states.subscribe(listener)
    }

    /// Async view of the state.
    pub fn watch(&self) -> watch::Receiver<BatchSnapshot> {
        self.inner.states.watch()
    }

    /// User-facing notices.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    /// Closes the event stream and stops the simulator. The batch stays
    /// persisted and resumes on the next restore.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        inner.stop_background();
        let captured = {
            let mut state = inner.lock_state();
            if !state.is_connected {
                return;
            }
            state.is_connected = false;
            state.capture()
        };
        inner.publish(captured);
        log::info!("Disconnected from event stream");
    }

    /// Abandons the current batch and resets to idle. Pending upload tasks
    /// stop silently; persisted state and stored blobs are removed.
    pub async fn cleanup(&self) {
        self.inner.reset().await;
    }

    /// Value copy of the current state.
    pub fn state(&self) -> BatchSnapshot {
        self.inner.lock_state().snapshot()
    }

    /// True from `start_batch` until completion, failure or cleanup.
    pub fn is_active(&self) -> bool {
        self.inner.lock_state().is_active()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, BatchState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Coordinator state lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Persists the state. Failures are logged; in-memory progress goes on.
    fn save(&self, state: &BatchState) {
        if let Some(batch) = state.persisted() {
            if let Err(e) = self.persistence.save(&batch) {
                log::error!("Failed to persist batch {}: {}", batch.batch_id, e);
            }
        }
    }

    fn clear_persisted(&self) {
        if let Err(e) = self.persistence.clear() {
            log::error!("Failed to clear persisted batch: {}", e);
        }
    }

    async fn clear_blobs(&self) {
        if let Err(e) = self.blobs.clear().await {
            log::warn!("Failed to clear blob store: {}", e);
        }
    }

    fn publish(&self, captured: Captured) {
        self.states.publish(captured.version, captured.snapshot);
    }

    fn current_uploader(&self) -> Option<Arc<dyn DocumentUploader>> {
        match self.uploader.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Starts the simulator and the stream consumer for the batch owning
    /// `token`, replacing any running ones.
    fn start_background(self: &Arc<Self>, batch_id: &str, token: &BatchToken) {
        let weak = Arc::downgrade(self);
        let tick_token = token.clone();
        self.simulator.start(move || match weak.upgrade() {
            Some(inner) => inner.on_tick(&tick_token),
            None => false,
        });

        let sink = Arc::new(StreamSink::new(Arc::downgrade(self), token.clone()));
        let task = self
            .stream
            .spawn(StreamTarget::new(batch_id, self.user_id.as_deref()), sink);

        let previous = {
            let mut slot = match self.stream_task.lock() {
                Ok(g) => g,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot.replace(task)
        };
        if let Some(previous) = previous {
            previous.stop();
        }
    }

    fn stop_background(&self) {
        self.simulator.stop();
        let task = match self.stream_task.lock() {
            Ok(mut g) => g.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            task.stop();
        }
    }

    /// Resumes the persisted batch, if any.
    fn restore(self: &Arc<Self>) {
        let batch = match self.persistence.load() {
            Ok(Some(batch)) => batch,
            Ok(None) => return,
            Err(e) => {
                log::error!("Failed to load persisted batch: {}", e);
                return;
            }
        };

        if batch.is_complete() {
            log::info!(
                "Persisted batch {} had already finished, clearing it",
                batch.batch_id
            );
            self.clear_persisted();
            let blobs = Arc::clone(&self.blobs);
            tokio::spawn(async move {
                if let Err(e) = blobs.clear().await {
                    log::warn!("Failed to clear blob store: {}", e);
                }
            });
            return;
        }

        let batch_id = batch.batch_id.clone();
        let pending = batch.pending_uploads();
        let token = BatchToken::new();
        let (captured, files) = {
            let mut state = self.lock_state();
            state.replace(BatchState::restored(batch, token.clone()));
            let claimed: Vec<String> = pending
                .into_iter()
                .filter(|name| state.claim_upload(name))
                .collect();
            (state.capture(), claimed)
        };
        self.publish(captured);
        log::info!("Restored batch {}, reconnecting", batch_id);

        self.start_background(&batch_id, &token);
        self.dispatch(&token, files);
    }
}
