//! Dependent upload of processed files: the local blob store holding the
//! original bytes, the uploader, and the per-file upload task.

use std::path::PathBuf;

pub mod blob_store;
pub mod dispatcher;
pub mod uploader;

pub use blob_store::{BlobStore, FsBlobStore, MemoryBlobStore, StoredFile};
pub use dispatcher::{run_upload, spawn_upload, UploadJob, UploadLedger};
pub use uploader::{DirectoryUploader, DocumentUploader};

/// Returns the default blob directory: `~/.batchwatch/blobs`.
pub fn default_blob_directory() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".batchwatch").join("blobs"))
}
