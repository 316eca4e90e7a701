//! Background task handle with cooperative shutdown.
//!
//! Tasks are told to stop through a watch channel instead of being aborted,
//! so a task that itself triggers teardown still finishes the work it is in
//! the middle of.

use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Receiving side of a shutdown request.
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Returns true once shutdown has been requested.
    pub fn is_set(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when shutdown is requested or the handle is dropped.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// A spawned task that can be asked to stop.
pub struct BackgroundTask {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Spawns `f` on the current Tokio runtime.
    pub fn spawn<F, Fut>(name: &'static str, f: F) -> Self
    where
        F: FnOnce(ShutdownSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(f(ShutdownSignal { rx }));
        log::debug!("Started background task '{}'", name);
        Self {
            name,
            shutdown,
            handle,
        }
    }

    /// Requests shutdown. The task exits at its next checkpoint.
    pub fn stop(self) {
        let _ = self.shutdown.send(true);
        log::debug!("Requested stop of background task '{}'", self.name);
    }

    /// True once the task has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
