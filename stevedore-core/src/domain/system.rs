//! Execution-system catalog types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Catalog definition of a target machine or cluster
///
/// Loaded once at startup and treated as read-only configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSystem {
    pub hostname: String,
    /// Login identity used for the non-interactive remote session.
    pub username: String,
    /// Root under which per-job staging directories are created.
    pub staging_root: String,
    /// Environment overrides applied to every command on this system.
    #[serde(default)]
    pub environment: HashMap<String, String>,
    pub backend: Backend,
}

/// Backend type tag, with per-backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Backend {
    /// Commands run on the orchestrator host itself.
    Local,
    /// Generic remote shell over a non-interactive session.
    Remote,
    /// Hadoop cluster with a second, cluster-local filesystem that staged
    /// data is mirrored into before the run.
    Hadoop { target_root: String },
    /// HPC batch scheduler; submission is asynchronous and the queue is
    /// polled until the job leaves it.
    Batch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_tag_round_trip() {
        let system: ExecutionSystem = serde_json::from_str(
            r#"{
                "hostname": "hadoop0.example.org",
                "username": "svc",
                "staging_root": "/scratch/jobs",
                "environment": {"JAVA_OPTS": "-Xmx4g"},
                "backend": {"type": "hadoop", "target_root": "/hdfs/jobs"}
            }"#,
        )
        .unwrap();

        match &system.backend {
            Backend::Hadoop { target_root } => assert_eq!(target_root, "/hdfs/jobs"),
            other => panic!("expected hadoop backend, got {:?}", other),
        }

        let local: ExecutionSystem = serde_json::from_str(
            r#"{
                "hostname": "localhost",
                "username": "svc",
                "staging_root": "/tmp/jobs",
                "backend": {"type": "local"}
            }"#,
        )
        .unwrap();
        assert!(matches!(local.backend, Backend::Local));
        assert!(local.environment.is_empty());
    }
}
