//! Long-lived consumer task for one batch's push channel.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;

use super::payload::decode_payload;
use super::{EventSource, EventStream, StreamTarget};
use crate::batch::JobUpdate;
use crate::config::ReconnectPolicy;
use crate::error::StreamError;
use crate::task::{BackgroundTask, ShutdownSignal};

/// Returned by [`UpdateSink::on_updates`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirective {
    Continue,
    /// Close the connection now and do not reconnect.
    Close,
}

/// Receiver of connection events.
///
/// Callbacks run on the consumer task and must not block.
#[async_trait]
pub trait UpdateSink: Send + Sync + 'static {
    fn on_open(&self);
    async fn on_updates(&self, updates: Vec<JobUpdate>) -> StreamDirective;
    fn on_error(&self, error: &StreamError);
}

enum SessionEnd {
    Closed,
    Shutdown,
    Failed(StreamError),
}

/// Spawns consumer tasks against an [`EventSource`].
#[derive(Clone)]
pub struct EventStreamConsumer {
    source: Arc<dyn EventSource>,
    policy: ReconnectPolicy,
}

impl EventStreamConsumer {
    pub fn new(source: Arc<dyn EventSource>, policy: ReconnectPolicy) -> Self {
        Self { source, policy }
    }

    /// Starts consuming `target`. Stop the returned task to disconnect.
    pub fn spawn(&self, target: StreamTarget, sink: Arc<dyn UpdateSink>) -> BackgroundTask {
        let source = Arc::clone(&self.source);
        let policy = self.policy.clone();
        BackgroundTask::spawn("event-stream", move |shutdown| {
            run(source, policy, target, sink, shutdown)
        })
    }
}

async fn run(
    source: Arc<dyn EventSource>,
    policy: ReconnectPolicy,
    target: StreamTarget,
    sink: Arc<dyn UpdateSink>,
    mut shutdown: ShutdownSignal,
) {
    let mut attempt = 0u32;
    loop {
        if shutdown.is_set() {
            return;
        }

        let connected = tokio::select! {
            _ = shutdown.wait() => return,
            result = source.connect(&target) => result,
        };

        let end = match connected {
            Ok(events) => {
                attempt = 0;
                log::info!("Event stream open for batch {}", target.batch_id);
                sink.on_open();
                consume(events, sink.as_ref(), &mut shutdown).await
            }
            Err(e) => SessionEnd::Failed(e),
        };

        match end {
            SessionEnd::Closed => {
                log::info!(
                    "Closed event stream for batch {}: all files finished on the server",
                    target.batch_id
                );
                return;
            }
            SessionEnd::Shutdown => {
                log::debug!("Event stream for batch {} shut down", target.batch_id);
                return;
            }
            SessionEnd::Failed(e) => {
                log::warn!("Event stream for batch {} failed: {}", target.batch_id, e);
                sink.on_error(&e);
            }
        }

        attempt += 1;
        let Some(delay) = policy.delay_for(attempt) else {
            log::info!(
                "Not reconnecting event stream for batch {}; it resumes on next restore",
                target.batch_id
            );
            return;
        };
        log::info!(
            "Reconnecting event stream for batch {} in {:?} (attempt {})",
            target.batch_id,
            delay,
            attempt
        );
        tokio::select! {
            _ = shutdown.wait() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn consume(
    mut events: EventStream,
    sink: &dyn UpdateSink,
    shutdown: &mut ShutdownSignal,
) -> SessionEnd {
    loop {
        let next = tokio::select! {
            _ = shutdown.wait() => return SessionEnd::Shutdown,
            item = events.next() => item,
        };

        match next {
            None => {
                return SessionEnd::Failed(StreamError::Transport(
                    "connection closed by server".to_string(),
                ))
            }
            Some(Err(e)) => return SessionEnd::Failed(e),
            Some(Ok(data)) => match decode_payload(&data) {
                Ok(updates) if updates.is_empty() => {}
                Ok(updates) => {
                    if sink.on_updates(updates).await == StreamDirective::Close {
                        return SessionEnd::Closed;
                    }
                }
                Err(e) => log::warn!("Skipping malformed batch update: {}", e),
            },
        }

        if shutdown.is_set() {
            return SessionEnd::Shutdown;
        }
    }
}
