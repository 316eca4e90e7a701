//! Server-Sent Events over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{future, stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::{Client, Url};

use super::{EventSource, EventStream, StreamTarget};
use crate::error::StreamError;
use crate::sanitize::redact_url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type, `None` for the default `message` type.
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental `text/event-stream` parser.
///
/// Bytes may be split anywhere, including inside a line or a UTF-8
/// sequence; complete lines are only processed once their terminator
/// arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    last_id: Option<String>,
}

impl SseDecoder {
    /// Feeds a chunk and returns every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.last_id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = self.data.join("\n");
        self.data.clear();
        Some(SseEvent {
            event,
            data,
            id: self.last_id.clone(),
        })
    }
}

/// [`EventSource`] reading `{base_url}/batches/{batch_id}/events`.
pub struct SseEventSource {
    client: Client,
    base_url: Url,
}

impl SseEventSource {
    pub fn new(base_url: &str) -> Result<Self, StreamError> {
        let parsed = Url::parse(base_url).map_err(|e| StreamError::InvalidUrl {
            url: redact_url(base_url),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(StreamError::InvalidUrl {
                url: redact_url(base_url),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: parsed,
        })
    }

    /// Builds the events URL for a batch. Path segments and the user id are
    /// percent-encoded.
    pub fn events_url(&self, target: &StreamTarget) -> Result<Url, StreamError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StreamError::InvalidUrl {
                url: redact_url(self.base_url.as_str()),
                reason: "URL cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend(["batches", target.batch_id.as_str(), "events"]);
        if let Some(user_id) = &target.user_id {
            url.query_pairs_mut().append_pair("userId", user_id);
        }
        Ok(url)
    }
}

#[async_trait]
impl EventSource for SseEventSource {
    async fn connect(&self, target: &StreamTarget) -> Result<EventStream, StreamError> {
        let url = self.events_url(target)?;
        log::info!("Opening event stream {}", redact_url(url.as_str()));

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| StreamError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status(status.as_u16()));
        }

        let events = response
            .bytes_stream()
            .scan(SseDecoder::default(), |decoder, chunk| {
                let items: Vec<Result<String, StreamError>> = match chunk {
                    Ok(bytes) => decoder
                        .feed(&bytes)
                        .into_iter()
                        .map(|event| {
                            if let Some(kind) = &event.event {
                                log::trace!("Received '{}' event", kind);
                            }
                            Ok(event.data)
                        })
                        .collect(),
                    Err(e) => vec![Err(StreamError::Transport(e.to_string()))],
                };
                future::ready(Some(stream::iter(items)))
            })
            .flatten()
            .boxed();

        Ok(events)
    }
}
