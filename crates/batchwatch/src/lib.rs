pub mod batch;
pub mod broadcast;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod logging;
pub mod sanitize;
pub mod stream;
pub mod task;
pub mod upload;

pub use batch::{BatchJob, FileMetadata, JobStatus, JobUpdate};
pub use broadcast::{BatchSnapshot, Notice, NoticeKind, Subscription};
pub use config::{load_config, CoordinatorConfig, ReconnectPolicy};
pub use coordinator::BatchCoordinator;
pub use error::{BatchError, BlobError, ConfigError, Result, StreamError, UploadError};
pub use stream::{ChannelEventSource, EventSource, SseEventSource};
pub use upload::{BlobStore, DirectoryUploader, DocumentUploader, FsBlobStore, MemoryBlobStore, StoredFile};
