//! User-facing notices (toasts) raised by the coordinator.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// What a notice is about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// The original bytes of a processed file were not found locally.
    MissingFile,
    /// The dependent upload of a file failed.
    UploadFailed,
    /// The batch was torn down after a failure.
    BatchFailed,
    /// Every file was processed and uploaded.
    BatchCompleted,
}

impl NoticeKind {
    pub fn is_error(self) -> bool {
        !matches!(self, NoticeKind::BatchCompleted)
    }
}

/// A notice for the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub kind: NoticeKind,
    /// Batch the notice belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    /// File the notice refers to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Human-readable text.
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Notice {
    fn new(kind: NoticeKind, batch_id: Option<&str>, file_name: Option<&str>, message: String) -> Self {
        Self {
            kind,
            batch_id: batch_id.map(str::to_string),
            file_name: file_name.map(str::to_string),
            message,
            timestamp: Utc::now(),
        }
    }

    pub fn missing_file(batch_id: Option<&str>, file_name: &str) -> Self {
        Self::new(
            NoticeKind::MissingFile,
            batch_id,
            Some(file_name),
            format!("Original file '{}' is no longer available locally", file_name),
        )
    }

    pub fn upload_failed(batch_id: Option<&str>, file_name: &str, error: &str) -> Self {
        Self::new(
            NoticeKind::UploadFailed,
            batch_id,
            Some(file_name),
            format!("Upload of '{}' failed: {}", file_name, error),
        )
    }

    pub fn batch_failed(batch_id: Option<&str>, reason: &str) -> Self {
        Self::new(
            NoticeKind::BatchFailed,
            batch_id,
            None,
            format!("Batch processing failed: {}", reason),
        )
    }

    pub fn batch_completed(batch_id: Option<&str>, files: usize) -> Self {
        Self::new(
            NoticeKind::BatchCompleted,
            batch_id,
            None,
            format!("All {} file(s) processed and uploaded", files),
        )
    }
}

/// Broadcaster for notices.
///
/// Cloning is cheap and every clone sends on the same channel.
#[derive(Clone)]
pub struct NoticeBroadcaster {
    sender: Arc<broadcast::Sender<Notice>>,
}

impl NoticeBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn send(&self, notice: Notice) {
        if notice.kind.is_error() {
            log::warn!("{}", notice.message);
        } else {
            log::info!("{}", notice.message);
        }
        // No active receivers is fine
        let _ = self.sender.send(notice);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }
}

impl Default for NoticeBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_notices() {
        let notices = NoticeBroadcaster::new(8);
        let mut rx1 = notices.subscribe();
        let mut rx2 = notices.subscribe();

        notices.send(Notice::missing_file(Some("b-1"), "a.pdf"));

        let n1 = rx1.recv().await.unwrap();
        let n2 = rx2.recv().await.unwrap();
        assert_eq!(n1.kind, NoticeKind::MissingFile);
        assert_eq!(n2.file_name.as_deref(), Some("a.pdf"));
        assert!(n1.message.contains("a.pdf"));
    }

    #[test]
    fn test_send_without_receivers() {
        NoticeBroadcaster::default().send(Notice::batch_completed(None, 2));
    }

    #[test]
    fn test_notice_serializes_camel_case() {
        let notice = Notice::upload_failed(Some("b-1"), "a.pdf", "disk full");
        let json = serde_json::to_string(&notice).unwrap();
        assert!(json.contains("\"kind\":\"upload_failed\""));
        assert!(json.contains("\"batchId\":\"b-1\""));
        assert!(json.contains("disk full"));
    }

    #[test]
    fn test_error_kinds() {
        assert!(NoticeKind::BatchFailed.is_error());
        assert!(NoticeKind::MissingFile.is_error());
        assert!(!NoticeKind::BatchCompleted.is_error());
    }
}
