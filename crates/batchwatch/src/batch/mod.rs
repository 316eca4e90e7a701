//! Batch data model: job records, the reconciliation rule, simulated
//! progress and the durable snapshot.

pub mod job;
pub mod persistence;
pub mod reconcile;
pub mod simulator;
pub mod store;

pub use job::{BatchJob, FileMetadata, JobStatus, JobUpdate, MAX_PROGRESS};
pub use persistence::{BatchPersistence, PersistedBatch};
pub use reconcile::{reconcile, Reconciled};
pub use simulator::{ProgressSimulator, SimulatedProgress};
pub use store::{JobRecordStore, UpdateOutcome};
