//! HPC batch submission and queue polling
//!
//! Submission hands the run script to `sbatch` and returns as soon as the
//! scheduler accepts it; the job's reserved name is then polled in the
//! queue at a fixed interval until it no longer appears. Polling is
//! bounded by a configurable timeout so a hung remote job cannot pin an
//! execution slot forever.

use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use stevedore_core::domain::job::Job;
use stevedore_core::domain::system::ExecutionSystem;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::backend::{BackendAdapter, PollSettings};
use crate::executor::{CommandExecutor, CommandLine, shell_quote};
use crate::pipeline::Workspace;

pub struct BatchAdapter {
    system: ExecutionSystem,
    executor: Arc<dyn CommandExecutor>,
    poll: PollSettings,
}

impl BatchAdapter {
    pub fn new(
        system: ExecutionSystem,
        executor: Arc<dyn CommandExecutor>,
        poll: PollSettings,
    ) -> Self {
        Self {
            system,
            executor,
            poll,
        }
    }
}

#[async_trait]
impl BackendAdapter for BatchAdapter {
    fn deferred(&self) -> bool {
        true
    }

    async fn submit(
        &self,
        job: &Job,
        workspace: &Workspace,
        arguments: &[String],
    ) -> anyhow::Result<()> {
        let mut command = CommandLine::new("sbatch")
            .arg("--parsable")
            .args(["--job-name", &job.id])
            .args(["--chdir", &workspace.staging_dir])
            .args(["--output", &workspace.job_log]);

        if let Some(profile) = &job.profile {
            if let Some(queue) = &profile.batch_queue {
                command = command.args(["--partition", queue]);
            }
            if let Some(time) = &profile.max_run_time {
                command = command.args(["--time", time]);
            }
            if let Some(nodes) = profile.node_count {
                command = command.args(["--nodes", &nodes.to_string()]);
            }
            if let Some(tasks) = profile.processors_per_node {
                command = command.args(["--ntasks-per-node", &tasks.to_string()]);
            }
            if let Some(memory) = &profile.memory_per_node {
                command = command.args(["--mem", memory]);
            }
        }

        // The wrapped payload is re-parsed by a shell on the compute node,
        // so it travels as one quoted token.
        let run = format!("sh {} {}", workspace.run_script, arguments.join(" "));
        command = command.arg("--wrap").arg(shell_quote(&run));

        let output = self.executor.execute(&self.system, &command).await?;
        info!(
            "Job {}: batch submission accepted as {}",
            job.id,
            output.trim()
        );
        Ok(())
    }

    async fn wait_until_done(&self, job: &Job) -> anyhow::Result<()> {
        let deadline = Instant::now() + self.poll.timeout;
        let query = CommandLine::new("squeue").args(["--noheader", "--name", &job.id]);

        loop {
            let output = self.executor.execute(&self.system, &query).await?;
            if output.trim().is_empty() {
                info!("Job {}: left the batch queue", job.id);
                return Ok(());
            }

            debug!("Job {}: still queued or running", job.id);
            if Instant::now() >= deadline {
                bail!(
                    "batch job {} still in queue after {:?}",
                    job.id,
                    self.poll.timeout
                );
            }
            sleep(self.poll.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutionError;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;
    use stevedore_core::domain::job::{ExecutionProfile, JobStatus};
    use stevedore_core::domain::system::Backend;

    /// Executor that replays scripted stdout responses.
    struct ScriptedExecutor {
        responses: Mutex<VecDeque<String>>,
        commands: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(String::from).collect()),
                commands: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            _system: &ExecutionSystem,
            command: &CommandLine,
        ) -> Result<String, ExecutionError> {
            self.commands.lock().unwrap().push(command.rendered());
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default())
        }
    }

    fn batch_system() -> ExecutionSystem {
        ExecutionSystem {
            hostname: "hpc.example.org".to_string(),
            username: "svc".to_string(),
            staging_root: "/scratch/jobs".to_string(),
            environment: HashMap::new(),
            backend: Backend::Batch,
        }
    }

    fn batch_job() -> Job {
        Job {
            id: "job-1".to_string(),
            owner: "alice".to_string(),
            token: "tok".to_string(),
            name: "align".to_string(),
            app_id: "aligner".to_string(),
            status: JobStatus::Submitting,
            inputs: HashMap::new(),
            parameters: HashMap::new(),
            profile: Some(ExecutionProfile {
                batch_queue: Some("normal".to_string()),
                max_run_time: Some("02:00:00".to_string()),
                node_count: Some(2),
                processors_per_node: Some(16),
                memory_per_node: Some("32G".to_string()),
            }),
            start_time: chrono::Utc::now(),
            end_time: None,
            history: Vec::new(),
        }
    }

    fn workspace() -> Workspace {
        Workspace {
            staging_dir: "/scratch/jobs/job-1".to_string(),
            data_dir: "/scratch/jobs/job-1/data".to_string(),
            bundle_dir: "/scratch/jobs/job-1/aligner".to_string(),
            run_script: "/scratch/jobs/job-1/aligner/run.sh".to_string(),
            job_log: "/scratch/jobs/job-1/job.log".to_string(),
            target_dir: None,
        }
    }

    fn poll_fast() -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(1),
            timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_submit_renders_profile_flags() {
        let executor = Arc::new(ScriptedExecutor::new(vec!["4242"]));
        let adapter = BatchAdapter::new(batch_system(), executor.clone(), poll_fast());

        adapter
            .submit(&batch_job(), &workspace(), &["-i".to_string(), "x".to_string()])
            .await
            .unwrap();

        let commands = executor.commands.lock().unwrap();
        let rendered = &commands[0];
        assert!(rendered.starts_with("sbatch --parsable --job-name job-1"));
        assert!(rendered.contains("--partition normal"));
        assert!(rendered.contains("--time 02:00:00"));
        assert!(rendered.contains("--nodes 2"));
        assert!(rendered.contains("--ntasks-per-node 16"));
        assert!(rendered.contains("--mem 32G"));
        assert!(rendered.contains("--wrap 'sh /scratch/jobs/job-1/aligner/run.sh -i x'"));
    }

    #[tokio::test]
    async fn test_wait_returns_when_queue_empties() {
        let executor = Arc::new(ScriptedExecutor::new(vec![
            "job-1 normal alice R",
            "job-1 normal alice R",
            "",
        ]));
        let adapter = BatchAdapter::new(batch_system(), executor.clone(), poll_fast());

        adapter.wait_until_done(&batch_job()).await.unwrap();
        assert_eq!(executor.commands.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_wait_times_out_on_stuck_job() {
        // Scripted responses run out, but the default response is also
        // non-empty here via an endless queue entry.
        struct StuckExecutor;

        #[async_trait]
        impl CommandExecutor for StuckExecutor {
            async fn execute(
                &self,
                _system: &ExecutionSystem,
                _command: &CommandLine,
            ) -> Result<String, ExecutionError> {
                Ok("job-1 normal alice R".to_string())
            }
        }

        let adapter = BatchAdapter::new(batch_system(), Arc::new(StuckExecutor), poll_fast());
        let err = adapter.wait_until_done(&batch_job()).await.unwrap_err();
        assert!(err.to_string().contains("still in queue"));
    }
}
