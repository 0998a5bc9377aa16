//! Scheduler loop
//!
//! A single designated instance polls the job store on a fixed interval
//! and launches waiting jobs, keeping the number of slot-occupying jobs
//! under a configured ceiling. The ceiling is evaluated against the
//! snapshot taken at the start of each tick, so a burst of submissions
//! can briefly overshoot it; it bounds steady-state load, not a hard
//! admission limit.

use std::sync::Arc;
use std::time::Duration;

use stevedore_core::domain::job::{Job, JobStatus};
use tracing::{debug, error, info};

use crate::service::JobManager;

pub struct Scheduler {
    manager: Arc<JobManager>,
    initial_delay: Duration,
    tick_interval: Duration,
    max_running: usize,
}

impl Scheduler {
    pub fn new(
        manager: Arc<JobManager>,
        initial_delay: Duration,
        tick_interval: Duration,
        max_running: usize,
    ) -> Self {
        Self {
            manager,
            initial_delay,
            tick_interval,
            max_running,
        }
    }

    /// Runs forever. A failed tick is logged and the next tick proceeds.
    pub async fn run(&self) {
        info!(
            "Scheduler starting: tick every {:?}, ceiling {}",
            self.tick_interval, self.max_running
        );
        tokio::time::sleep(self.initial_delay).await;

        let mut ticker = tokio::time::interval(self.tick_interval);
        loop {
            ticker.tick().await;
            if let Err(err) = self.tick().await {
                error!("Scheduler tick failed: {}", err);
            }
        }
    }

    async fn tick(&self) -> Result<(), crate::service::JobError> {
        let active = self.manager.get_active_jobs().await?;
        let running = active.iter().filter(|j| j.status.occupies_slot()).count();

        let launchable = select_launchable(&active, running, self.max_running);
        if launchable.is_empty() {
            debug!("Tick: {} active, {} occupying slots, nothing to launch", active.len(), running);
            return Ok(());
        }

        let mut in_use = running;
        for job in launchable {
            in_use += 1;
            info!(
                "Launching job {} ({}/{} slot(s) in use)",
                job.id, in_use, self.max_running
            );
            self.manager.launch(job);
        }
        Ok(())
    }
}

/// Picks the CREATED jobs that fit under the ceiling given the current
/// slot usage, oldest first.
fn select_launchable(active: &[Job], running: usize, ceiling: usize) -> Vec<Job> {
    let open = ceiling.saturating_sub(running);
    active
        .iter()
        .filter(|j| j.status == JobStatus::Created)
        .take(open)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn job(id: &str, status: JobStatus) -> Job {
        Job {
            id: id.to_string(),
            owner: "alice".to_string(),
            token: "tok".to_string(),
            name: "align".to_string(),
            app_id: "aligner".to_string(),
            status,
            inputs: HashMap::new(),
            parameters: HashMap::new(),
            profile: None,
            start_time: chrono::Utc::now(),
            end_time: None,
            history: Vec::new(),
        }
    }

    #[test]
    fn test_launches_only_up_to_open_slots() {
        let active = vec![
            job("j1", JobStatus::Created),
            job("j2", JobStatus::Created),
            job("j3", JobStatus::Created),
        ];
        let picked = select_launchable(&active, 2, 4);
        let ids: Vec<&str> = picked.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["j1", "j2"]);
    }

    #[test]
    fn test_full_slots_launch_nothing() {
        let active = vec![job("j1", JobStatus::Created)];
        assert!(select_launchable(&active, 4, 4).is_empty());
        assert!(select_launchable(&active, 5, 4).is_empty());
    }

    #[test]
    fn test_only_created_jobs_are_candidates() {
        let active = vec![
            job("j1", JobStatus::Running),
            job("j2", JobStatus::StagingInputs),
            job("j3", JobStatus::Created),
        ];
        let picked = select_launchable(&active, 2, 4);
        let ids: Vec<&str> = picked.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["j3"]);
    }

    #[test]
    fn test_slot_counting_matches_status_set() {
        let active = [
            job("j1", JobStatus::StagingInputs),
            job("j2", JobStatus::Running),
            job("j3", JobStatus::Submitting),
            job("j4", JobStatus::Created),
        ];
        let running = active.iter().filter(|j| j.status.occupies_slot()).count();
        assert_eq!(running, 2);
    }
}
