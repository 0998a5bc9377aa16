//! Backend adapters
//!
//! One submission strategy per execution-system backend type, behind a
//! common submit/wait interface. Shell and hadoop submissions run the job
//! synchronously; batch submission returns as soon as the scheduler
//! accepts the job, and the queue is polled until the job leaves it.

mod batch;
mod hadoop;
mod shell;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stevedore_core::domain::job::Job;
use stevedore_core::domain::system::{Backend, ExecutionSystem};

use crate::executor::CommandExecutor;
use crate::pipeline::Workspace;

pub use batch::BatchAdapter;
pub use hadoop::HadoopAdapter;
pub use shell::ShellAdapter;

/// Batch-queue polling settings
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Per-backend submission strategy
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Backend-specific staging, run after inputs land in the staging
    /// area. Most backends need nothing here.
    async fn stage(&self, _job: &Job, _workspace: &Workspace) -> anyhow::Result<()> {
        Ok(())
    }

    /// Whether submission is asynchronous: the job is queued on return
    /// and must be polled with [`BackendAdapter::wait_until_done`].
    fn deferred(&self) -> bool {
        false
    }

    /// Launches the job with the assembled argument list.
    async fn submit(
        &self,
        job: &Job,
        workspace: &Workspace,
        arguments: &[String],
    ) -> anyhow::Result<()>;

    /// Blocks until a deferred submission has left the queue.
    async fn wait_until_done(&self, _job: &Job) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Selects the adapter for a system's backend type.
pub fn adapter_for(
    system: &ExecutionSystem,
    executor: Arc<dyn CommandExecutor>,
    poll: PollSettings,
) -> Box<dyn BackendAdapter> {
    match &system.backend {
        Backend::Local | Backend::Remote => Box::new(ShellAdapter::new(system.clone(), executor)),
        Backend::Hadoop { .. } => Box::new(HadoopAdapter::new(system.clone(), executor)),
        Backend::Batch => Box::new(BatchAdapter::new(system.clone(), executor, poll)),
    }
}
