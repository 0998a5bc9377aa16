//! Job domain types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One user-requested unit of work, tracked through the staged pipeline.
///
/// Persisted by the orchestrator and mutated only through status
/// transitions; once a terminal status is reached the record is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    /// Identity that owns the job and its archived outputs.
    pub owner: String,
    /// Opaque capability token used for data-store permission grants.
    /// Cleared when a restart forces the job to Stopped.
    pub token: String,
    pub name: String,
    pub app_id: String,
    pub status: JobStatus,
    /// Input-slot id to one or more source locations in the data store.
    pub inputs: HashMap<String, InputValue>,
    pub parameters: HashMap<String, ParameterValue>,
    /// Resource request, meaningful only for batch-scheduler backends.
    /// Persisted as actually used so the audit trail survives later
    /// changes to App defaults.
    pub profile: Option<ExecutionProfile>,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    /// Append-only transition log.
    pub history: Vec<HistoryEntry>,
}

impl Job {
    /// Generates a fresh job id.
    pub fn generate_id() -> String {
        format!("job-{}", Uuid::new_v4())
    }

    /// Applies a status change, recording it in the history log.
    ///
    /// A no-op when the status is unchanged. The end timestamp is set the
    /// first time a terminal status is reached and never touched again.
    /// Callers are expected to have validated the edge with
    /// [`JobStatus::can_transition_to`].
    pub fn set_status(&mut self, new_status: JobStatus, actor: &str, description: &str) {
        if self.status == new_status {
            return;
        }

        self.status = new_status;
        self.history.push(HistoryEntry {
            timestamp: chrono::Utc::now(),
            created_by: actor.to_string(),
            description: description.to_string(),
            status: new_status,
        });

        if new_status.is_terminal() && self.end_time.is_none() {
            self.end_time = Some(chrono::Utc::now());
        }
    }
}

/// Job lifecycle status
///
/// Forward-only pipeline with two terminal short-circuits: Failed is
/// reachable from any non-terminal state, Stopped is assigned only during
/// startup recovery. Submitting exists only for batch-scheduler backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Created,
    StagingInputs,
    Submitting,
    Running,
    Archiving,
    Finished,
    Failed,
    Stopped,
}

impl JobStatus {
    /// Wire/store representation, matching the persisted rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "CREATED",
            JobStatus::StagingInputs => "STAGING_INPUTS",
            JobStatus::Submitting => "SUBMITTING",
            JobStatus::Running => "RUNNING",
            JobStatus::Archiving => "ARCHIVING",
            JobStatus::Finished => "FINISHED",
            JobStatus::Failed => "FAILED",
            JobStatus::Stopped => "STOPPED",
        }
    }

    pub fn parse(s: &str) -> Option<JobStatus> {
        match s {
            "CREATED" => Some(JobStatus::Created),
            "STAGING_INPUTS" => Some(JobStatus::StagingInputs),
            "SUBMITTING" => Some(JobStatus::Submitting),
            "RUNNING" => Some(JobStatus::Running),
            "ARCHIVING" => Some(JobStatus::Archiving),
            "FINISHED" => Some(JobStatus::Finished),
            "FAILED" => Some(JobStatus::Failed),
            "STOPPED" => Some(JobStatus::Stopped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Finished | JobStatus::Failed | JobStatus::Stopped
        )
    }

    /// Whether the job occupies one of the capped execution slots.
    pub fn occupies_slot(&self) -> bool {
        matches!(self, JobStatus::StagingInputs | JobStatus::Running)
    }

    /// Valid forward edges of the lifecycle DAG.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, JobStatus::Failed) | (_, JobStatus::Stopped) => true,
            (JobStatus::Created, JobStatus::StagingInputs) => true,
            (JobStatus::StagingInputs, JobStatus::Submitting) => true,
            (JobStatus::StagingInputs, JobStatus::Running) => true,
            (JobStatus::Submitting, JobStatus::Running) => true,
            (JobStatus::Running, JobStatus::Archiving) => true,
            (JobStatus::Archiving, JobStatus::Finished) => true,
            _ => false,
        }
    }
}

/// One entry of a job's append-only history log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub created_by: String,
    pub description: String,
    pub status: JobStatus,
}

/// Resource request for batch-scheduler backends
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    pub batch_queue: Option<String>,
    pub max_run_time: Option<String>,
    pub node_count: Option<u32>,
    pub processors_per_node: Option<u32>,
    pub memory_per_node: Option<String>,
}

impl ExecutionProfile {
    /// Fills unset fields from App-level defaults.
    pub fn merged_with(mut self, defaults: &ExecutionProfile) -> ExecutionProfile {
        self.batch_queue = self.batch_queue.or_else(|| defaults.batch_queue.clone());
        self.max_run_time = self.max_run_time.or_else(|| defaults.max_run_time.clone());
        self.node_count = self.node_count.or(defaults.node_count);
        self.processors_per_node = self.processors_per_node.or(defaults.processors_per_node);
        self.memory_per_node = self
            .memory_per_node
            .or_else(|| defaults.memory_per_node.clone());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == ExecutionProfile::default()
    }
}

/// An input slot value: a single source location or several
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    One(String),
    Many(Vec<String>),
}

impl InputValue {
    pub fn values(&self) -> &[String] {
        match self {
            InputValue::One(v) => std::slice::from_ref(v),
            InputValue::Many(v) => v,
        }
    }
}

/// A parameter value: scalar, boolean, or list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    List(Vec<String>),
    Number(serde_json::Number),
    Text(String),
}

impl ParameterValue {
    /// Renders the value as a single command-line token, joining list
    /// entries with one space. Returns `None` for blank values.
    pub fn rendered(&self) -> Option<String> {
        match self {
            ParameterValue::Bool(b) => Some(b.to_string()),
            ParameterValue::Number(n) => Some(n.to_string()),
            ParameterValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            ParameterValue::List(items) => {
                let joined = items
                    .iter()
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                if joined.is_empty() { None } else { Some(joined) }
            }
        }
    }

    pub fn is_blank(&self) -> bool {
        self.rendered().is_none()
    }

    /// Truth test for flag-type parameters.
    pub fn is_truthy(&self) -> bool {
        match self {
            ParameterValue::Bool(b) => *b,
            ParameterValue::Text(s) => s.trim() == "true",
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobStatus; 8] = [
        JobStatus::Created,
        JobStatus::StagingInputs,
        JobStatus::Submitting,
        JobStatus::Running,
        JobStatus::Archiving,
        JobStatus::Finished,
        JobStatus::Failed,
        JobStatus::Stopped,
    ];

    fn sample_job() -> Job {
        Job {
            id: Job::generate_id(),
            owner: "alice".to_string(),
            token: "tok".to_string(),
            name: "test".to_string(),
            app_id: "app-1".to_string(),
            status: JobStatus::Created,
            inputs: HashMap::new(),
            parameters: HashMap::new(),
            profile: None,
            start_time: chrono::Utc::now(),
            end_time: None,
            history: Vec::new(),
        }
    }

    #[test]
    fn test_only_pipeline_edges_are_valid() {
        let forward = [
            (JobStatus::Created, JobStatus::StagingInputs),
            (JobStatus::StagingInputs, JobStatus::Submitting),
            (JobStatus::StagingInputs, JobStatus::Running),
            (JobStatus::Submitting, JobStatus::Running),
            (JobStatus::Running, JobStatus::Archiving),
            (JobStatus::Archiving, JobStatus::Finished),
        ];

        for from in ALL {
            for to in ALL {
                let expected = !from.is_terminal()
                    && (to == JobStatus::Failed
                        || to == JobStatus::Stopped
                        || forward.contains(&(from, to)));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "unexpected edge {:?} -> {:?}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_admit_no_edges() {
        for from in [JobStatus::Finished, JobStatus::Failed, JobStatus::Stopped] {
            for to in ALL {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in ALL {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("BOGUS"), None);
    }

    #[test]
    fn test_set_status_appends_history() {
        let mut job = sample_job();
        job.set_status(JobStatus::StagingInputs, "alice", "Staging inputs");
        job.set_status(JobStatus::Running, "alice", "Job running");
        assert_eq!(job.history.len(), 2);
        assert_eq!(job.history[0].status, JobStatus::StagingInputs);
        assert_eq!(job.history[1].created_by, "alice");
        assert!(job.end_time.is_none());

        // Same status is a no-op
        job.set_status(JobStatus::Running, "alice", "again");
        assert_eq!(job.history.len(), 2);
    }

    #[test]
    fn test_end_time_set_once_on_terminal() {
        let mut job = sample_job();
        job.set_status(JobStatus::Failed, "alice", "boom");
        let first = job.end_time.expect("end time set on terminal status");

        job.end_time = Some(first);
        job.status = JobStatus::Failed;
        // Re-entering a terminal state must not move the end timestamp.
        job.set_status(JobStatus::Failed, "alice", "boom again");
        assert_eq!(job.end_time, Some(first));
    }

    #[test]
    fn test_parameter_rendering() {
        assert_eq!(
            ParameterValue::Text("  x  ".to_string()).rendered(),
            Some("x".to_string())
        );
        assert_eq!(ParameterValue::Text("   ".to_string()).rendered(), None);
        assert_eq!(
            ParameterValue::List(vec!["a".to_string(), "b".to_string()]).rendered(),
            Some("a b".to_string())
        );
        assert_eq!(ParameterValue::List(vec![]).rendered(), None);
        assert!(ParameterValue::Bool(true).is_truthy());
        assert!(!ParameterValue::Bool(false).is_truthy());
        assert!(ParameterValue::Text("true".to_string()).is_truthy());
    }

    #[test]
    fn test_parameter_value_deserializes_untagged() {
        let v: ParameterValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, ParameterValue::Bool(true));
        let v: ParameterValue = serde_json::from_str("[\"a\",\"b\"]").unwrap();
        assert_eq!(
            v,
            ParameterValue::List(vec!["a".to_string(), "b".to_string()])
        );
        let v: ParameterValue = serde_json::from_str("20").unwrap();
        assert_eq!(v.rendered(), Some("20".to_string()));
        let v: ParameterValue = serde_json::from_str("\"map\"").unwrap();
        assert_eq!(v, ParameterValue::Text("map".to_string()));
    }

    #[test]
    fn test_profile_merge_keeps_explicit_values() {
        let supplied = ExecutionProfile {
            batch_queue: Some("debug".to_string()),
            ..Default::default()
        };
        let defaults = ExecutionProfile {
            batch_queue: Some("normal".to_string()),
            node_count: Some(2),
            ..Default::default()
        };
        let merged = supplied.merged_with(&defaults);
        assert_eq!(merged.batch_queue.as_deref(), Some("debug"));
        assert_eq!(merged.node_count, Some(2));
    }
}
