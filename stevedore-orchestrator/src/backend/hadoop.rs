//! Hadoop submission
//!
//! Two-filesystem backend: inputs staged onto the gateway host are
//! mirrored into the cluster filesystem before the run, and the run
//! script receives the cluster-side data directory as its first argument.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use stevedore_core::domain::job::Job;
use stevedore_core::domain::system::ExecutionSystem;
use tracing::info;

use crate::backend::BackendAdapter;
use crate::executor::{CommandExecutor, CommandLine};
use crate::pipeline::Workspace;

pub struct HadoopAdapter {
    system: ExecutionSystem,
    executor: Arc<dyn CommandExecutor>,
}

impl HadoopAdapter {
    pub fn new(system: ExecutionSystem, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { system, executor }
    }

    fn target_dir<'a>(&self, workspace: &'a Workspace) -> anyhow::Result<&'a str> {
        workspace
            .target_dir
            .as_deref()
            .context("hadoop system has no target directory")
    }
}

#[async_trait]
impl BackendAdapter for HadoopAdapter {
    async fn stage(&self, job: &Job, workspace: &Workspace) -> anyhow::Result<()> {
        let target = self.target_dir(workspace)?;

        info!("Job {}: mirroring staged data into {}", job.id, target);
        self.executor
            .execute(
                &self.system,
                &CommandLine::new("hdfs").args(["dfs", "-mkdir", "-p", target]),
            )
            .await?;
        self.executor
            .execute(
                &self.system,
                &CommandLine::new("hdfs")
                    .args(["dfs", "-put", "-f"])
                    .arg(&workspace.data_dir)
                    .arg(target),
            )
            .await?;
        Ok(())
    }

    async fn submit(
        &self,
        job: &Job,
        workspace: &Workspace,
        arguments: &[String],
    ) -> anyhow::Result<()> {
        let target_data = format!("{}/data", self.target_dir(workspace)?);

        let command = CommandLine::new("sh")
            .arg(&workspace.run_script)
            .arg(&target_data)
            .args(arguments.iter().cloned());

        info!("Job {}: running {} against {}", job.id, workspace.run_script, target_data);
        self.executor.execute(&self.system, &command).await?;
        Ok(())
    }
}
