//! In-memory job record store, the single source of truth for one batch.

use std::collections::{HashMap, HashSet};

use super::job::{BatchJob, JobStatus, JobUpdate};
use super::reconcile::reconcile;
use super::simulator::SimulatedProgress;
use crate::error::BatchError;

/// Result of applying one server record to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The record names a file that is not part of the batch.
    UnknownFile,
    /// The job is already final; the record was dropped.
    Ignored,
    /// In-flight progress was merged. `changed` reports whether anything moved.
    Progressed { changed: bool },
    /// The server reported (or repeated) completion of the file.
    Completed,
    /// The server reported a failure for the file.
    Failed { error: String },
}

/// Ordered mapping from file name to job record.
#[derive(Debug, Clone, Default)]
pub struct JobRecordStore {
    order: Vec<String>,
    jobs: HashMap<String, BatchJob>,
}

impl JobRecordStore {
    /// Creates a store with every file pending at zero progress.
    pub fn from_file_names<S: AsRef<str>>(file_names: &[S]) -> Result<Self, BatchError> {
        let mut seen = HashSet::new();
        for name in file_names {
            let name = name.as_ref();
            if name.trim().is_empty() {
                return Err(BatchError::EmptyFileName);
            }
            if !seen.insert(name) {
                return Err(BatchError::DuplicateFileName(name.to_string()));
            }
        }

        Ok(Self::from_jobs(
            file_names
                .iter()
                .map(|n| BatchJob::pending(n.as_ref()))
                .collect(),
        ))
    }

    /// Seeds a store from previously persisted records. Later duplicates win.
    pub fn from_jobs(jobs: Vec<BatchJob>) -> Self {
        let mut store = Self::default();
        for job in jobs {
            if !store.jobs.contains_key(&job.file_name) {
                store.order.push(job.file_name.clone());
            }
            store.jobs.insert(job.file_name.clone(), job);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.jobs.contains_key(file_name)
    }

    pub fn get(&self, file_name: &str) -> Option<&BatchJob> {
        self.jobs.get(file_name)
    }

    pub fn get_mut(&mut self, file_name: &str) -> Option<&mut BatchJob> {
        self.jobs.get_mut(file_name)
    }

    /// Iterates jobs in batch order.
    pub fn iter(&self) -> impl Iterator<Item = &BatchJob> {
        self.order.iter().filter_map(|name| self.jobs.get(name))
    }

    /// Returns value copies of all jobs in batch order.
    pub fn jobs(&self) -> Vec<BatchJob> {
        self.iter().cloned().collect()
    }

    /// Mean of per-job progress, rounded. Zero for an empty batch.
    pub fn overall_progress(&self) -> u8 {
        if self.is_empty() {
            return 0;
        }
        let total: u32 = self.iter().map(|j| j.progress as u32).sum();
        ((total as f64) / (self.len() as f64)).round() as u8
    }

    /// True when the server has finished with every file.
    pub fn all_server_terminal(&self) -> bool {
        !self.is_empty() && self.iter().all(|j| j.status.is_server_terminal())
    }

    /// Names of jobs the server has completed, in batch order.
    pub fn completed_file_names(&self) -> Vec<String> {
        self.iter()
            .filter(|j| matches!(j.status, JobStatus::Completed | JobStatus::Uploading))
            .map(|j| j.file_name.clone())
            .collect()
    }

    /// Merges one server record into the store.
    pub fn apply_update(
        &mut self,
        update: &JobUpdate,
        simulated: &mut SimulatedProgress,
    ) -> UpdateOutcome {
        let Some(job) = self.jobs.get_mut(&update.file_name) else {
            log::warn!(
                "Ignoring update for '{}': not part of the current batch",
                update.file_name
            );
            return UpdateOutcome::UnknownFile;
        };

        if update.job_id.is_some() && job.job_id.is_none() {
            job.job_id = update.job_id.clone();
        }

        match job.status {
            JobStatus::Completed | JobStatus::Uploading
                if update.status == JobStatus::Completed =>
            {
                return UpdateOutcome::Completed;
            }
            status if status.is_terminal() || status == JobStatus::Uploading => {
                log::debug!(
                    "Ignoring {} update for '{}': job is already {}",
                    update.status,
                    update.file_name,
                    status
                );
                return UpdateOutcome::Ignored;
            }
            _ => {}
        }

        let merged = reconcile(
            simulated.get(&update.file_name),
            update.progress,
            update.status,
        );
        match merged.simulated {
            Some(value) => simulated.set(&update.file_name, value),
            None => simulated.stop(&update.file_name),
        }

        match update.status {
            JobStatus::Completed => {
                job.mark_completed();
                UpdateOutcome::Completed
            }
            JobStatus::Failed | JobStatus::Error => {
                let error = update
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("Server reported status '{}'", update.status));
                job.status = update.status;
                job.progress = merged.displayed;
                job.error = Some(error.clone());
                UpdateOutcome::Failed { error }
            }
            JobStatus::Pending | JobStatus::Processing | JobStatus::Uploading => {
                let mut changed = job.raise_progress(merged.displayed);
                let still_pending = job.status == JobStatus::Pending
                    && update.status == JobStatus::Pending
                    && job.progress == 0;
                if !still_pending && job.status != JobStatus::Processing {
                    job.status = JobStatus::Processing;
                    changed = true;
                }
                UpdateOutcome::Progressed { changed }
            }
        }
    }

    /// Advances the simulated counter of every in-flight job by `step`,
    /// capped at `ceiling`, and raises displayed progress where the
    /// simulation is ahead. Returns true if any job changed.
    pub fn simulate_tick(&mut self, simulated: &mut SimulatedProgress, step: u8, ceiling: u8) -> bool {
        let mut changed = false;
        for name in &self.order {
            let Some(job) = self.jobs.get_mut(name) else {
                continue;
            };
            if !job.status.is_in_flight() {
                continue;
            }
            let value = simulated.advance(name, step, ceiling);
            if job.raise_progress(value) {
                if job.status == JobStatus::Pending {
                    job.status = JobStatus::Processing;
                }
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(names: &[&str]) -> JobRecordStore {
        JobRecordStore::from_file_names(names).unwrap()
    }

    #[test]
    fn test_new_store_is_pending() {
        let store = store(&["a.pdf", "b.pdf"]);
        assert_eq!(store.len(), 2);
        for job in store.iter() {
            assert_eq!(job.status, JobStatus::Pending);
            assert_eq!(job.progress, 0);
        }
        let names: Vec<_> = store.iter().map(|j| j.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
    }

    #[test]
    fn test_duplicate_file_names_rejected() {
        let err = JobRecordStore::from_file_names(&["a.pdf", "a.pdf"]).unwrap_err();
        assert!(matches!(err, BatchError::DuplicateFileName(ref n) if n == "a.pdf"));
    }

    #[test]
    fn test_empty_file_name_rejected() {
        let err = JobRecordStore::from_file_names(&["a.pdf", "  "]).unwrap_err();
        assert!(matches!(err, BatchError::EmptyFileName));
    }

    #[test]
    fn test_overall_progress() {
        let mut store = store(&["a.pdf", "b.pdf"]);
        store.get_mut("a.pdf").unwrap().raise_progress(100);
        store.get_mut("b.pdf").unwrap().raise_progress(51);
        assert_eq!(store.overall_progress(), 76);
        assert_eq!(JobRecordStore::default().overall_progress(), 0);
    }

    #[test]
    fn test_completed_update_pins_progress() {
        let mut store = store(&["a.pdf", "b.pdf"]);
        let mut sim = SimulatedProgress::default();
        sim.set("a.pdf", 40);

        let outcome = store.apply_update(&JobUpdate::completed("a.pdf"), &mut sim);
        assert_eq!(outcome, UpdateOutcome::Completed);

        let job = store.get("a.pdf").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(sim.get("a.pdf"), 100);
        assert_eq!(store.get("b.pdf").unwrap().progress, 0);
    }

    #[test]
    fn test_completed_job_ignores_later_progress() {
        let mut store = store(&["a.pdf"]);
        let mut sim = SimulatedProgress::default();
        store.apply_update(&JobUpdate::completed("a.pdf"), &mut sim);

        let outcome = store.apply_update(
            &JobUpdate::new("a.pdf", JobStatus::Processing, 10),
            &mut sim,
        );
        assert_eq!(outcome, UpdateOutcome::Ignored);
        assert_eq!(store.get("a.pdf").unwrap().progress, 100);
        assert_eq!(store.get("a.pdf").unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn test_repeated_completion_reported() {
        let mut store = store(&["a.pdf"]);
        let mut sim = SimulatedProgress::default();
        store.apply_update(&JobUpdate::completed("a.pdf"), &mut sim);
        let outcome = store.apply_update(&JobUpdate::completed("a.pdf"), &mut sim);
        assert_eq!(outcome, UpdateOutcome::Completed);
    }

    #[test]
    fn test_failed_update_stops_simulation() {
        let mut store = store(&["a.pdf"]);
        let mut sim = SimulatedProgress::default();
        sim.set("a.pdf", 60);

        let outcome = store.apply_update(&JobUpdate::failed("a.pdf", 20, "corrupt"), &mut sim);
        assert_eq!(
            outcome,
            UpdateOutcome::Failed {
                error: "corrupt".to_string()
            }
        );
        let job = store.get("a.pdf").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 20);
        assert!(!sim.contains("a.pdf"));
    }

    #[test]
    fn test_failure_without_message_gets_default_error() {
        let mut store = store(&["a.pdf"]);
        let mut sim = SimulatedProgress::default();
        let outcome =
            store.apply_update(&JobUpdate::new("a.pdf", JobStatus::Error, 5), &mut sim);
        assert!(matches!(outcome, UpdateOutcome::Failed { ref error } if error.contains("Error")));
    }

    #[test]
    fn test_in_flight_update_never_regresses() {
        let mut store = store(&["a.pdf"]);
        let mut sim = SimulatedProgress::default();
        sim.set("a.pdf", 50);
        store.get_mut("a.pdf").unwrap().raise_progress(50);

        let outcome = store.apply_update(
            &JobUpdate::new("a.pdf", JobStatus::Processing, 30),
            &mut sim,
        );
        assert_eq!(outcome, UpdateOutcome::Progressed { changed: true });
        let job = store.get("a.pdf").unwrap();
        assert_eq!(job.progress, 50);
        assert_eq!(job.status, JobStatus::Processing);

        store.apply_update(&JobUpdate::new("a.pdf", JobStatus::Processing, 80), &mut sim);
        assert_eq!(store.get("a.pdf").unwrap().progress, 80);
        assert_eq!(sim.get("a.pdf"), 80);
    }

    #[test]
    fn test_pending_update_with_zero_progress_stays_pending() {
        let mut store = store(&["a.pdf"]);
        let mut sim = SimulatedProgress::default();
        let outcome =
            store.apply_update(&JobUpdate::new("a.pdf", JobStatus::Pending, 0), &mut sim);
        assert_eq!(outcome, UpdateOutcome::Progressed { changed: false });
        assert_eq!(store.get("a.pdf").unwrap().status, JobStatus::Pending);
    }

    #[test]
    fn test_job_id_recorded() {
        let mut store = store(&["a.pdf"]);
        let mut sim = SimulatedProgress::default();
        store.apply_update(
            &JobUpdate::new("a.pdf", JobStatus::Processing, 10).with_job_id("srv-9"),
            &mut sim,
        );
        assert_eq!(store.get("a.pdf").unwrap().job_id.as_deref(), Some("srv-9"));
    }

    #[test]
    fn test_unknown_file_update() {
        let mut store = store(&["a.pdf"]);
        let mut sim = SimulatedProgress::default();
        let outcome = store.apply_update(&JobUpdate::completed("zzz.pdf"), &mut sim);
        assert_eq!(outcome, UpdateOutcome::UnknownFile);
    }

    #[test]
    fn test_all_server_terminal() {
        let mut store = store(&["a.pdf", "b.pdf"]);
        let mut sim = SimulatedProgress::default();
        assert!(!store.all_server_terminal());

        store.apply_update(&JobUpdate::completed("a.pdf"), &mut sim);
        assert!(!store.all_server_terminal());

        store.get_mut("a.pdf").unwrap().status = JobStatus::Uploading;
        store.apply_update(&JobUpdate::failed("b.pdf", 0, "x"), &mut sim);
        assert!(store.all_server_terminal());
        assert!(!JobRecordStore::default().all_server_terminal());
    }

    #[test]
    fn test_simulate_tick_advances_in_flight_jobs() {
        let mut store = store(&["a.pdf", "b.pdf"]);
        let mut sim = SimulatedProgress::default();
        store.apply_update(&JobUpdate::completed("b.pdf"), &mut sim);

        assert!(store.simulate_tick(&mut sim, 10, 95));
        let a = store.get("a.pdf").unwrap();
        assert_eq!(a.progress, 10);
        assert_eq!(a.status, JobStatus::Processing);
        assert_eq!(store.get("b.pdf").unwrap().progress, 100);
    }

    #[test]
    fn test_simulate_tick_respects_ceiling() {
        let mut store = store(&["a.pdf"]);
        let mut sim = SimulatedProgress::default();
        for _ in 0..50 {
            store.simulate_tick(&mut sim, 7, 95);
        }
        assert_eq!(store.get("a.pdf").unwrap().progress, 95);
        assert!(!store.simulate_tick(&mut sim, 7, 95));
    }

    #[test]
    fn test_simulate_tick_below_displayed_changes_nothing() {
        let mut store = store(&["a.pdf"]);
        let mut sim = SimulatedProgress::default();
        store.get_mut("a.pdf").unwrap().raise_progress(60);
        store.get_mut("a.pdf").unwrap().status = JobStatus::Processing;

        assert!(!store.simulate_tick(&mut sim, 5, 95));
        assert_eq!(store.get("a.pdf").unwrap().progress, 60);
    }

    #[test]
    fn test_from_jobs_keeps_order() {
        let mut b = BatchJob::pending("b.pdf");
        b.raise_progress(30);
        let store = JobRecordStore::from_jobs(vec![b, BatchJob::pending("a.pdf")]);
        let names: Vec<_> = store.iter().map(|j| j.file_name.clone()).collect();
        assert_eq!(names, vec!["b.pdf", "a.pdf"]);
        assert_eq!(store.get("b.pdf").unwrap().progress, 30);
    }

    #[test]
    fn test_completed_file_names() {
        let mut store = store(&["a.pdf", "b.pdf", "c.pdf"]);
        let mut sim = SimulatedProgress::default();
        store.apply_update(&JobUpdate::completed("a.pdf"), &mut sim);
        store.apply_update(&JobUpdate::completed("c.pdf"), &mut sim);
        store.get_mut("c.pdf").unwrap().status = JobStatus::Uploading;
        assert_eq!(store.completed_file_names(), vec!["a.pdf", "c.pdf"]);
    }
}
