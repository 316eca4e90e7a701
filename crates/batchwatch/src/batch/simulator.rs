//! Locally simulated progress, so the UI never looks frozen between
//! server pushes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use super::job::{BatchJob, MAX_PROGRESS};
use crate::task::BackgroundTask;

/// Simulated counter per file. Never authoritative and never persisted.
#[derive(Debug, Clone, Default)]
pub struct SimulatedProgress {
    counters: HashMap<String, u8>,
}

impl SimulatedProgress {
    /// Seeds counters from persisted jobs so a restored batch resumes
    /// from where it was instead of from zero.
    pub fn seeded_from<'a>(jobs: impl IntoIterator<Item = &'a BatchJob>) -> Self {
        let counters = jobs
            .into_iter()
            .filter(|j| !j.status.is_failure())
            .map(|j| (j.file_name.clone(), j.progress))
            .collect();
        Self { counters }
    }

    pub fn get(&self, file_name: &str) -> u8 {
        self.counters.get(file_name).copied().unwrap_or(0)
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.counters.contains_key(file_name)
    }

    pub fn set(&mut self, file_name: &str, value: u8) {
        self.counters
            .insert(file_name.to_string(), value.min(MAX_PROGRESS));
    }

    /// Stops simulating a file.
    pub fn stop(&mut self, file_name: &str) {
        self.counters.remove(file_name);
    }

    /// Adds `step` to the counter, never beyond `ceiling`. A counter already
    /// above the ceiling (a confirmed completion) is left alone.
    pub fn advance(&mut self, file_name: &str, step: u8, ceiling: u8) -> u8 {
        let counter = self.counters.entry(file_name.to_string()).or_insert(0);
        if *counter < ceiling {
            *counter = counter.saturating_add(step).min(ceiling);
        }
        *counter
    }

    pub fn clear(&mut self) {
        self.counters.clear();
    }
}

/// Fixed-period ticker driving simulated progress.
pub struct ProgressSimulator {
    period: Duration,
    running: Mutex<Option<BackgroundTask>>,
}

impl ProgressSimulator {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            running: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Starts ticking. `on_tick` returns false to end the ticker.
    ///
    /// Any ticker already running is stopped first.
    pub fn start<F>(&self, mut on_tick: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let period = self.period;
        let task = BackgroundTask::spawn("progress-simulator", move |mut shutdown| async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await; // skip immediate first tick

            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    _ = interval.tick() => {
                        if shutdown.is_set() || !on_tick() {
                            break;
                        }
                    }
                }
            }
            log::debug!("Progress simulator stopped");
        });

        let mut running = match self.running.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Simulator lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        if let Some(previous) = running.replace(task) {
            previous.stop();
        }
    }

    /// Stops the ticker. Idempotent.
    pub fn stop(&self) {
        let mut running = match self.running.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Simulator lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        if let Some(task) = running.take() {
            task.stop();
        }
    }

    /// True while a ticker is active.
    pub fn is_running(&self) -> bool {
        match self.running.lock() {
            Ok(g) => g.as_ref().is_some_and(|t| !t.is_finished()),
            Err(poisoned) => poisoned.into_inner().as_ref().is_some_and(|t| !t.is_finished()),
        }
    }
}

impl Drop for ProgressSimulator {
    fn drop(&mut self) {
        self.stop();
    }
}
