//! Per-file job records and the server update records that drive them.

use serde::{Deserialize, Serialize};

/// Upper bound of any progress value.
pub const MAX_PROGRESS: u8 = 100;

/// Status of one file's journey through the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Uploading,
    Completed,
    Failed,
    Error,
}

impl JobStatus {
    /// No further transition is possible from this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Error)
    }

    /// Server-side processing is still running and the simulator may advance it.
    pub fn is_in_flight(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }

    /// The server has finished with this file, successfully or not.
    ///
    /// `Uploading` only follows a server `completed`, so it counts too.
    pub fn is_server_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Uploading | JobStatus::Failed | JobStatus::Error
        )
    }

    /// A server-reported failure that escalates to whole-batch cleanup.
    pub fn is_failure(self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "Pending"),
            JobStatus::Processing => write!(f, "Processing"),
            JobStatus::Uploading => write!(f, "Uploading"),
            JobStatus::Completed => write!(f, "Completed"),
            JobStatus::Failed => write!(f, "Failed"),
            JobStatus::Error => write!(f, "Error"),
        }
    }
}

/// The tracked lifecycle of a single file within a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    /// File name, unique within the batch.
    pub file_name: String,
    /// Current status.
    pub status: JobStatus,
    /// Displayed progress, 0-100.
    pub progress: u8,
    /// Error message (set on failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Server-assigned correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl BatchJob {
    /// Creates a pending job with no progress.
    pub fn pending(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            status: JobStatus::Pending,
            progress: 0,
            error: None,
            job_id: None,
        }
    }

    /// Raises displayed progress, never lowering it.
    ///
    /// Returns true if the value changed.
    pub fn raise_progress(&mut self, progress: u8) -> bool {
        let progress = progress.min(MAX_PROGRESS);
        if progress > self.progress {
            self.progress = progress;
            true
        } else {
            false
        }
    }

    /// Marks the job as fully completed with progress pinned to 100.
    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.progress = MAX_PROGRESS;
        self.error = None;
    }
}

/// Lightweight description of an original file, used to rebuild a listing
/// after a reload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub id: String,
    pub name: String,
    pub size: u64,
}

impl FileMetadata {
    pub fn new(id: &str, name: &str, size: u64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            size,
        }
    }
}

/// One record of a batch-update event pushed by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobUpdate {
    pub file_name: String,
    pub status: JobStatus,
    #[serde(default, deserialize_with = "deserialize_progress")]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl JobUpdate {
    /// Creates an update record.
    pub fn new(file_name: &str, status: JobStatus, progress: u8) -> Self {
        Self {
            file_name: file_name.to_string(),
            status,
            progress: progress.min(MAX_PROGRESS),
            error: None,
            job_id: None,
        }
    }

    /// Creates a completion record.
    pub fn completed(file_name: &str) -> Self {
        Self::new(file_name, JobStatus::Completed, MAX_PROGRESS)
    }

    /// Creates a failure record.
    pub fn failed(file_name: &str, progress: u8, error: &str) -> Self {
        let mut update = Self::new(file_name, JobStatus::Failed, progress);
        update.error = Some(error.to_string());
        update
    }

    pub fn with_job_id(mut self, job_id: &str) -> Self {
        self.job_id = Some(job_id.to_string());
        self
    }
}

/// Servers report progress as an arbitrary JSON number; clamp it into 0-100.
fn deserialize_progress<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    if value.is_nan() {
        return Ok(0);
    }
    Ok(value.clamp(0.0, MAX_PROGRESS as f64).round() as u8)
}
