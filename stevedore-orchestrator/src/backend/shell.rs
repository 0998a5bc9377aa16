//! Synchronous shell submission (local and generic-remote backends)

use std::sync::Arc;

use async_trait::async_trait;
use stevedore_core::domain::job::Job;
use stevedore_core::domain::system::ExecutionSystem;
use tracing::info;

use crate::backend::BackendAdapter;
use crate::executor::{CommandExecutor, CommandLine};
use crate::pipeline::Workspace;

/// Runs the app's run script directly and waits for it to exit
pub struct ShellAdapter {
    system: ExecutionSystem,
    executor: Arc<dyn CommandExecutor>,
}

impl ShellAdapter {
    pub fn new(system: ExecutionSystem, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { system, executor }
    }
}

#[async_trait]
impl BackendAdapter for ShellAdapter {
    async fn submit(
        &self,
        job: &Job,
        workspace: &Workspace,
        arguments: &[String],
    ) -> anyhow::Result<()> {
        let command = CommandLine::new("sh")
            .arg(&workspace.run_script)
            .args(arguments.iter().cloned());

        info!("Job {}: running {}", job.id, workspace.run_script);
        let output = self.executor.execute(&self.system, &command).await?;
        info!("Job {}: run finished ({} bytes of output)", job.id, output.len());
        Ok(())
    }
}
