//! Per-job pipeline
//!
//! The staged operations the scheduler drives a job through: staging
//! inputs into a per-job working area, building the command-line argument
//! list, submitting through the backend adapter, waiting on deferred
//! submissions, and archiving outputs back to the data store. Every
//! external action goes through the Command Executor or the DataStore
//! collaborator; nothing here persists state.

use std::sync::Arc;

use anyhow::Context;
use stevedore_core::domain::app::{App, ValueType};
use stevedore_core::domain::job::{Job, ParameterValue};
use stevedore_core::domain::system::{Backend, ExecutionSystem};
use tracing::{debug, info};

use crate::backend::BackendAdapter;
use crate::datastore::{DataStore, Permission, split_parent};
use crate::executor::{CommandExecutor, CommandLine};

/// Per-job path layout on the execution system
#[derive(Debug, Clone)]
pub struct Workspace {
    /// `<staging-root>/<job-id>`
    pub staging_dir: String,
    /// Inputs land here, outputs are archived from here.
    pub data_dir: String,
    /// Where the app bundle unpacks.
    pub bundle_dir: String,
    pub run_script: String,
    pub job_log: String,
    /// Cluster-filesystem mirror for two-filesystem backends.
    pub target_dir: Option<String>,
}

impl Workspace {
    pub fn new(job_id: &str, app: &App, system: &ExecutionSystem) -> Self {
        let staging_dir = format!("{}/{}", system.staging_root.trim_end_matches('/'), job_id);
        let bundle_dir = format!("{}/{}", staging_dir, app.bundle_name());
        let target_dir = match &system.backend {
            Backend::Hadoop { target_root } => {
                Some(format!("{}/{}", target_root.trim_end_matches('/'), job_id))
            }
            _ => None,
        };
        Self {
            data_dir: format!("{}/data", staging_dir),
            run_script: format!("{}/run.sh", bundle_dir),
            job_log: format!("{}/job.log", staging_dir),
            staging_dir,
            bundle_dir,
            target_dir,
        }
    }
}

/// Data-store path conventions for staging and archival
#[derive(Debug, Clone)]
pub struct StagingSettings {
    /// Root of per-user homes in the data store.
    pub store_home: String,
    /// Directory under a user's home where job outputs land.
    pub archive_root: String,
}

impl StagingSettings {
    pub fn home_of(&self, owner: &str) -> String {
        format!("{}/{}", self.store_home, owner)
    }

    /// Publicly shared namespace; permission propagation is skipped here.
    pub fn shared_prefix(&self) -> String {
        format!("{}/shared", self.store_home)
    }

    pub fn archive_dir(&self, owner: &str) -> String {
        format!("{}/{}", self.home_of(owner), self.archive_root)
    }

    /// Job ids already carry their `job-` marker, so the archive directory
    /// is named by the id alone.
    pub fn archive_path(&self, owner: &str, job_id: &str) -> String {
        format!("{}/{}", self.archive_dir(owner), job_id)
    }

    /// Absolute data-store path for a user-supplied input location.
    pub fn store_path(&self, path: &str) -> String {
        if path.starts_with(&self.store_home) {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.store_home, path)
        } else {
            format!("{}/{}", self.store_home, path)
        }
    }
}

/// Staged operations for one job
pub struct JobPipeline {
    app: App,
    system: ExecutionSystem,
    workspace: Workspace,
    adapter: Box<dyn BackendAdapter>,
    executor: Arc<dyn CommandExecutor>,
    store: Arc<dyn DataStore>,
    settings: StagingSettings,
}

impl JobPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_id: &str,
        app: App,
        system: ExecutionSystem,
        adapter: Box<dyn BackendAdapter>,
        executor: Arc<dyn CommandExecutor>,
        store: Arc<dyn DataStore>,
        settings: StagingSettings,
    ) -> Self {
        let workspace = Workspace::new(job_id, &app, &system);
        Self {
            app,
            system,
            workspace,
            adapter,
            executor,
            store,
            settings,
        }
    }

    /// Whether submission is asynchronous (batch backends).
    pub fn deferred(&self) -> bool {
        self.adapter.deferred()
    }

    /// Prepares the working area: staging directory, app bundle, job log,
    /// permission propagation, then input transfers.
    ///
    /// All permission grants for the job complete before the first input
    /// transfer begins; transfers may depend on not-yet-granted
    /// permissions on sibling paths.
    pub async fn stage_inputs(&self, job: &Job) -> anyhow::Result<()> {
        let ws = &self.workspace;

        self.executor
            .execute(
                &self.system,
                &CommandLine::new("mkdir").arg("-p").arg(&ws.data_dir),
            )
            .await
            .context("creating staging area")?;

        self.executor
            .execute(
                &self.system,
                &CommandLine::new("iget")
                    .arg("-Tr")
                    .arg(&self.app.deployment_path)
                    .arg(&ws.staging_dir),
            )
            .await
            .context("downloading app bundle")?;

        self.executor
            .execute(&self.system, &CommandLine::new("touch").arg(&ws.job_log))
            .await
            .context("creating job log")?;

        // Permission phase. The owner's home must be readable for grants
        // beneath it to take effect; the archive directory may not exist
        // yet for a new user.
        let home = self.settings.home_of(&job.owner);
        self.store
            .share_path(&job.token, &home, Permission::Read, false)
            .await
            .context("sharing home directory")?;

        let archive_dir = self.settings.archive_dir(&job.owner);
        self.store
            .make_directory(&job.token, &archive_dir)
            .await
            .context("creating archive directory")?;
        self.store
            .share_path(&job.token, &archive_dir, Permission::ReadWrite, false)
            .await
            .context("sharing archive directory")?;

        let inputs = normalized_inputs(job);
        let shared_prefix = self.settings.shared_prefix();

        for path in &inputs {
            let store_path = self.settings.store_path(path);
            if store_path.starts_with(&shared_prefix) {
                debug!("Job {}: {} is publicly shared, skipping grant", job.id, store_path);
                continue;
            }

            self.store
                .share_path(&job.token, &store_path, Permission::Read, true)
                .await
                .with_context(|| format!("sharing input {}", store_path))?;

            // A file is only reachable if its parent directory is too.
            if is_file_like(&store_path) {
                let (parent, _) = split_parent(&store_path);
                self.store
                    .share_path(&job.token, parent, Permission::Read, false)
                    .await
                    .with_context(|| format!("sharing parent of {}", store_path))?;
            }
        }

        // Transfer phase.
        for path in &inputs {
            let store_path = self.settings.store_path(path);
            let target = format!("{}/{}", ws.data_dir, basename(path));
            info!("Job {}: staging input {}", job.id, store_path);
            self.executor
                .execute(
                    &self.system,
                    &CommandLine::new("iget").arg("-Tr").arg(&store_path).arg(&target),
                )
                .await
                .with_context(|| format!("staging input {}", store_path))?;
        }

        self.adapter.stage(job, ws).await
    }

    /// Builds the argument list and submits through the backend adapter.
    pub async fn execute(&self, job: &Job) -> anyhow::Result<()> {
        let arguments = build_arguments(&self.app, job, &self.workspace.data_dir);
        self.adapter.submit(job, &self.workspace, &arguments).await
    }

    /// Waits for a deferred submission to leave the batch queue.
    pub async fn wait(&self, job: &Job) -> anyhow::Result<()> {
        self.adapter.wait_until_done(job).await
    }

    /// Transfers the job's output area back to the data store and hands
    /// ownership of the archived data to the job owner.
    pub async fn archive(&self, job: &Job) -> anyhow::Result<()> {
        let archive_path = self.settings.archive_path(&job.owner, &job.id);

        info!("Job {}: archiving outputs to {}", job.id, archive_path);
        self.executor
            .execute(
                &self.system,
                &CommandLine::new("iput")
                    .arg("-Tr")
                    .arg(&self.workspace.data_dir)
                    .arg(&archive_path),
            )
            .await
            .context("archiving outputs")?;

        self.executor
            .execute(
                &self.system,
                &CommandLine::new("ichmod")
                    .args(["-r", "own"])
                    .arg(&job.owner)
                    .arg(&archive_path),
            )
            .await
            .context("assigning archive ownership")?;

        Ok(())
    }
}

/// Flattens the input map into distinct, trimmed, non-empty paths,
/// preserving first-seen order. Defensive against malformed input maps.
pub fn normalized_inputs(job: &Job) -> Vec<String> {
    let mut seen = Vec::new();
    for value in job.inputs.values() {
        for path in value.values() {
            let trimmed = path.trim();
            if trimmed.is_empty() {
                continue;
            }
            if !seen.iter().any(|s: &String| s == trimmed) {
                seen.push(trimmed.to_string());
            }
        }
    }
    seen
}

/// Final path segment.
pub fn basename(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

/// Heuristic: a final segment with an extension denotes a file. The data
/// store is not queried.
fn is_file_like(path: &str) -> bool {
    std::path::Path::new(path.trim_end_matches('/'))
        .extension()
        .is_some()
}

/// Assembles the command-line argument list for a job.
///
/// Inputs come first in App definition order, resolved to their staged
/// copies under `data_dir`. Parameters follow in App definition order:
/// blank values fall back to the App default and are omitted when still
/// blank, flag parameters emit only their flag token and only when true,
/// list values join with single spaces, and values are double-quoted when
/// the App requires it.
pub fn build_arguments(app: &App, job: &Job, data_dir: &str) -> Vec<String> {
    let mut arguments = Vec::new();

    for slot in &app.inputs {
        let Some(value) = job.inputs.get(&slot.id) else {
            continue;
        };
        let staged: Vec<String> = value
            .values()
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(|p| format!("{}/{}", data_dir, basename(p)))
            .collect();
        if staged.is_empty() {
            continue;
        }
        if !slot.argument.is_empty() {
            arguments.push(slot.argument.clone());
        }
        arguments.push(staged.join(" "));
    }

    for slot in &app.parameters {
        let supplied = job.parameters.get(&slot.id);
        let effective: Option<&ParameterValue> = match supplied {
            Some(v) if !v.is_blank() => Some(v),
            _ => slot.default.as_ref(),
        };

        match slot.value_type {
            ValueType::Flag => {
                if effective.is_some_and(|v| v.is_truthy()) {
                    arguments.push(slot.argument.clone());
                }
            }
            ValueType::Text | ValueType::List => {
                let Some(rendered) = effective.and_then(|v| v.rendered()) else {
                    continue;
                };
                if !slot.argument.is_empty() {
                    arguments.push(slot.argument.clone());
                }
                if slot.enquote {
                    arguments.push(format!("\"{}\"", rendered));
                } else {
                    arguments.push(rendered);
                }
            }
        }
    }

    arguments
}
