use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Event stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Blob store error: {0}")]
    Blob(#[from] BlobError),

    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Batch id must not be empty")]
    EmptyBatchId,

    #[error("Batch contains an empty file name")]
    EmptyFileName,

    #[error("File '{0}' appears more than once in the batch")]
    DuplicateFileName(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Invalid event stream URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Event stream transport failed: {0}")]
    Transport(String),

    #[error("Event stream rejected with HTTP status {0}")]
    Status(u16),

    #[error("Failed to decode batch update: {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Upload rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Blob store I/O failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, BatchError>;
