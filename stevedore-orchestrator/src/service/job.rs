//! Job Manager
//!
//! Business logic for job submission, lookup, lifecycle transitions, and
//! crash recovery. The (external) API layer calls the submission and
//! lookup operations; the scheduler drives `launch` and, at startup,
//! `recover`. Every transition is persisted before the next pipeline
//! stage starts.

use std::sync::Arc;

use sqlx::SqlitePool;
use stevedore_core::domain::job::{Job, JobStatus};
use stevedore_core::dto::job::SubmitJob;

use crate::backend::{self, PollSettings};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::datastore::DataStore;
use crate::executor::CommandExecutor;
use crate::pipeline::{JobPipeline, StagingSettings};
use crate::repository::job as job_repository;

/// Service error type
#[derive(Debug)]
pub enum JobError {
    NotFound(String),
    UnknownApp(String),
    UnknownSystem(String),
    InvalidTransition { from: JobStatus, to: JobStatus },
    DatabaseError(sqlx::Error),
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::NotFound(id) => write!(f, "job {} not found", id),
            JobError::UnknownApp(id) => write!(f, "app {} is not in the catalog", id),
            JobError::UnknownSystem(id) => {
                write!(f, "execution system {} is not in the catalog", id)
            }
            JobError::InvalidTransition { from, to } => {
                write!(f, "invalid transition {} -> {}", from.as_str(), to.as_str())
            }
            JobError::DatabaseError(err) => write!(f, "database error: {}", err),
        }
    }
}

impl std::error::Error for JobError {}

impl From<sqlx::Error> for JobError {
    fn from(err: sqlx::Error) -> Self {
        JobError::DatabaseError(err)
    }
}

/// Owns the job store and the collaborators the pipeline needs
pub struct JobManager {
    pool: SqlitePool,
    catalog: Arc<Catalog>,
    executor: Arc<dyn CommandExecutor>,
    data_store: Arc<dyn DataStore>,
    config: Config,
}

impl JobManager {
    pub fn new(
        pool: SqlitePool,
        catalog: Arc<Catalog>,
        executor: Arc<dyn CommandExecutor>,
        data_store: Arc<dyn DataStore>,
        config: Config,
    ) -> Self {
        Self {
            pool,
            catalog,
            executor,
            data_store,
            config,
        }
    }

    /// Validates and persists a new job as CREATED.
    ///
    /// The execution profile actually stored is the submission's profile
    /// with App defaults filled in, so later catalog changes cannot
    /// rewrite a job's audit trail.
    pub async fn submit_job(&self, request: SubmitJob) -> Result<Job, JobError> {
        let app = self
            .catalog
            .app(&request.app_id)
            .ok_or_else(|| JobError::UnknownApp(request.app_id.clone()))?;
        self.catalog
            .system(&app.execution_system)
            .ok_or_else(|| JobError::UnknownSystem(app.execution_system.clone()))?;

        let profile = request
            .profile
            .unwrap_or_default()
            .merged_with(&app.profile);

        let id = request
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(Job::generate_id);

        let now = chrono::Utc::now();
        let job = Job {
            id,
            owner: request.owner.clone(),
            token: request.token,
            name: request.name,
            app_id: request.app_id,
            status: JobStatus::Created,
            inputs: request.inputs,
            parameters: request.parameters,
            profile: if profile.is_empty() { None } else { Some(profile) },
            start_time: now,
            end_time: None,
            history: vec![stevedore_core::domain::job::HistoryEntry {
                timestamp: now,
                created_by: request.owner,
                description: "Job accepted".to_string(),
                status: JobStatus::Created,
            }],
        };

        job_repository::insert(&self.pool, &job).await?;
        tracing::info!("Job submitted: {} (app {})", job.id, job.app_id);
        Ok(job)
    }

    /// Fetches a job by id, scoped to the requesting identity.
    ///
    /// The administrative identity sees every job; anyone else sees only
    /// jobs they own. A job the requester may not see reads as not found.
    pub async fn get_job(&self, id: &str, requester: &str) -> Result<Job, JobError> {
        let job = job_repository::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;

        if requester != self.config.admin_user && job.owner != requester {
            return Err(JobError::NotFound(id.to_string()));
        }
        Ok(job)
    }

    /// Lists jobs visible to the requesting identity.
    pub async fn get_jobs(&self, requester: &str) -> Result<Vec<Job>, JobError> {
        let jobs = if requester == self.config.admin_user {
            job_repository::list_all(&self.pool).await?
        } else {
            job_repository::find_by_owner(&self.pool, requester).await?
        };
        Ok(jobs)
    }

    /// All jobs not yet in a terminal state; consumed by the scheduler.
    pub async fn get_active_jobs(&self) -> Result<Vec<Job>, JobError> {
        Ok(job_repository::find_active(&self.pool).await?)
    }

    /// Applies and persists a status transition.
    pub async fn transition_job(
        &self,
        job: &mut Job,
        new_status: JobStatus,
        description: &str,
    ) -> Result<(), JobError> {
        if job.status == new_status {
            return Ok(());
        }
        if !job.status.can_transition_to(new_status) {
            return Err(JobError::InvalidTransition {
                from: job.status,
                to: new_status,
            });
        }

        tracing::info!(
            "Job {}: {} -> {}",
            job.id,
            job.status.as_str(),
            new_status.as_str()
        );

        let actor = job.owner.clone();
        job.set_status(new_status, &actor, description);
        job_repository::update(&self.pool, job).await?;
        Ok(())
    }

    /// Startup crash recovery: every non-terminal job becomes STOPPED.
    ///
    /// An in-flight job cannot be resumed safely after a crash, so it is
    /// marked abandoned rather than silently retried or left stuck.
    pub async fn recover(&self) -> Result<u64, JobError> {
        let stopped = job_repository::stop_active(&self.pool).await?;
        if stopped > 0 {
            tracing::info!("Recovery: marked {} active job(s) STOPPED", stopped);
        }
        Ok(stopped)
    }

    /// Fire-and-forget pipeline launch with its own error boundary.
    pub fn launch(self: &Arc<Self>, job: Job) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.run_job(job).await;
        });
    }

    /// Drives one job through its full pipeline. Any error aborts the
    /// remaining stages and records FAILED; partial side effects are not
    /// rolled back and the job cannot be resubmitted under the same id.
    pub async fn run_job(&self, mut job: Job) {
        tracing::info!("Job {}: starting pipeline", job.id);

        match self.drive_pipeline(&mut job).await {
            Ok(()) => tracing::info!("Job {}: finished", job.id),
            Err(err) => {
                tracing::error!("Job {}: pipeline failed: {:#}", job.id, err);
                let description = format!("Job failed: {:#}", err);
                if let Err(persist_err) = self
                    .transition_job(&mut job, JobStatus::Failed, &description)
                    .await
                {
                    tracing::error!(
                        "Job {}: could not record failure: {}",
                        job.id,
                        persist_err
                    );
                }
            }
        }
    }

    async fn drive_pipeline(&self, job: &mut Job) -> anyhow::Result<()> {
        let (app, system) = self
            .catalog
            .resolve(&job.app_id)
            .ok_or_else(|| JobError::UnknownApp(job.app_id.clone()))?;

        let adapter = backend::adapter_for(
            system,
            Arc::clone(&self.executor),
            PollSettings {
                interval: self.config.poll_interval,
                timeout: self.config.poll_timeout,
            },
        );
        let pipeline = JobPipeline::new(
            &job.id,
            app.clone(),
            system.clone(),
            adapter,
            Arc::clone(&self.executor),
            Arc::clone(&self.data_store),
            StagingSettings {
                store_home: self.config.store_home.clone(),
                archive_root: self.config.archive_root.clone(),
            },
        );

        self.transition_job(job, JobStatus::StagingInputs, "Staging input data")
            .await?;
        pipeline.stage_inputs(job).await?;

        if pipeline.deferred() {
            self.transition_job(job, JobStatus::Submitting, "Submitting to batch scheduler")
                .await?;
            pipeline.execute(job).await?;
            self.transition_job(job, JobStatus::Running, "Job running")
                .await?;
            pipeline.wait(job).await?;
        } else {
            self.transition_job(job, JobStatus::Running, "Job running")
                .await?;
            pipeline.execute(job).await?;
        }

        self.transition_job(job, JobStatus::Archiving, "Archiving outputs")
            .await?;
        pipeline.archive(job).await?;

        self.transition_job(job, JobStatus::Finished, "Job finished successfully")
            .await?;
        Ok(())
    }
}
