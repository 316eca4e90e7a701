//! Server-push channel delivering batch-update events.
//!
//! An [`EventSource`] opens one connection per batch and yields the raw
//! `data` payload of every event. The [`consumer`] decodes payloads and
//! hands them to the coordinator.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::StreamError;

pub mod channel;
pub mod consumer;
pub mod payload;
pub mod sse;

pub use channel::ChannelEventSource;
pub use consumer::{EventStreamConsumer, StreamDirective, UpdateSink};
pub use payload::decode_payload;
pub use sse::{SseDecoder, SseEvent, SseEventSource};

/// What a connection is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub batch_id: String,
    pub user_id: Option<String>,
}

impl StreamTarget {
    pub fn new(batch_id: &str, user_id: Option<&str>) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            user_id: user_id.map(str::to_string),
        }
    }
}

/// Raw event payloads of one open connection. Ends when the connection closes.
pub type EventStream = BoxStream<'static, Result<String, StreamError>>;

/// Opens push connections for a batch.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn connect(&self, target: &StreamTarget) -> Result<EventStream, StreamError>;
}
