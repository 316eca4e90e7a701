//! Merge rule between simulated and server-reported progress.
//!
//! Timer ticks and server events for the same file arrive in no particular
//! order. Taking the maximum of both signals makes the merge idempotent and
//! order-independent.

use super::job::{JobStatus, MAX_PROGRESS};

/// Outcome of merging one server record with the local simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    /// Progress to display for the file.
    pub displayed: u8,
    /// New simulated counter, or `None` when simulation for the file stops.
    pub simulated: Option<u8>,
}

/// Merges the simulated counter with a server-reported `(backend, status)`.
pub fn reconcile(simulated: u8, backend: u8, status: JobStatus) -> Reconciled {
    let backend = backend.min(MAX_PROGRESS);
    match status {
        JobStatus::Completed => Reconciled {
            displayed: MAX_PROGRESS,
            simulated: Some(MAX_PROGRESS),
        },
        JobStatus::Failed | JobStatus::Error => Reconciled {
            displayed: backend,
            simulated: None,
        },
        JobStatus::Pending | JobStatus::Processing | JobStatus::Uploading => {
            let displayed = simulated.max(backend).min(MAX_PROGRESS);
            Reconciled {
                displayed,
                simulated: Some(displayed),
            }
        }
    }
}
