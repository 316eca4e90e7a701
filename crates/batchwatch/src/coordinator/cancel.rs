//! Batch-scoped cooperative cancellation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Points inside an upload task where an abandoned batch stops the work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    BeforeLookup,
    BeforeUpload,
    AfterUpload,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checkpoint::BeforeLookup => write!(f, "before blob lookup"),
            Checkpoint::BeforeUpload => write!(f, "before upload"),
            Checkpoint::AfterUpload => write!(f, "after upload"),
        }
    }
}

/// Cancellation flag shared by every task of one batch.
///
/// Once cancelled a token stays cancelled; a new batch gets a new token.
#[derive(Debug, Clone, Default)]
pub struct BatchToken {
    cancelled: Arc<AtomicBool>,
}

impl BatchToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns false, silently, when work at `checkpoint` must stop.
    pub fn check(&self, checkpoint: Checkpoint) -> bool {
        if self.is_cancelled() {
            log::debug!("Batch abandoned, stopping upload work {}", checkpoint);
            return false;
        }
        true
    }
}
