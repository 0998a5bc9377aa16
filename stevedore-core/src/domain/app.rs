//! App catalog types
//!
//! An App describes a runnable program: where its deployment bundle lives
//! in the data store, which execution system it targets, and how its
//! inputs and parameters map onto command-line arguments. Catalog entries
//! are loaded once at startup and treated as read-only configuration.

use serde::{Deserialize, Serialize};

use crate::domain::job::{ExecutionProfile, ParameterValue};

/// Catalog definition of a runnable program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    /// Key of the target system in the execution-system catalog.
    pub execution_system: String,
    /// Data-store path of the deployment bundle (contains `run.sh`).
    pub deployment_path: String,
    #[serde(default)]
    pub inputs: Vec<InputSlot>,
    #[serde(default)]
    pub parameters: Vec<ParameterSlot>,
    /// Default execution-profile values for batch backends.
    #[serde(default)]
    pub profile: ExecutionProfile,
}

impl App {
    /// Final segment of the deployment path; the bundle unpacks into a
    /// directory of this name inside the staging area.
    pub fn bundle_name(&self) -> &str {
        self.deployment_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("")
    }

    pub fn parameter(&self, id: &str) -> Option<&ParameterSlot> {
        self.parameters.iter().find(|slot| slot.id == id)
    }
}

/// Ordered input-slot definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSlot {
    pub id: String,
    /// Command-line flag emitted before the staged path, e.g. `-i`.
    /// Empty means the path is passed positionally.
    #[serde(default)]
    pub argument: String,
}

/// Ordered parameter definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSlot {
    pub id: String,
    #[serde(default)]
    pub argument: String,
    pub value_type: ValueType,
    /// Fallback when the submission leaves the parameter blank.
    #[serde(default)]
    pub default: Option<ParameterValue>,
    /// Whether the rendered value must be wrapped in double quotes.
    #[serde(default)]
    pub enquote: bool,
}

/// Parameter value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[serde(rename = "string")]
    Text,
    Flag,
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_name() {
        let app = App {
            execution_system: "hpc".to_string(),
            deployment_path: "/apps/blast-2.9/".to_string(),
            inputs: vec![],
            parameters: vec![],
            profile: ExecutionProfile::default(),
        };
        assert_eq!(app.bundle_name(), "blast-2.9");
    }

    #[test]
    fn test_app_deserializes_from_catalog_json() {
        let app: App = serde_json::from_str(
            r#"{
                "execution_system": "cluster-1",
                "deployment_path": "/apps/aligner",
                "inputs": [{"id": "IN", "argument": "-i"}],
                "parameters": [
                    {"id": "VERBOSE", "argument": "-v", "value_type": "flag"},
                    {"id": "MODE", "argument": "-m", "value_type": "string",
                     "default": "map", "enquote": true},
                    {"id": "TAGS", "argument": "-t", "value_type": "list"}
                ],
                "profile": {"batch_queue": "normal", "node_count": 2}
            }"#,
        )
        .unwrap();

        assert_eq!(app.inputs.len(), 1);
        assert_eq!(app.parameter("VERBOSE").unwrap().value_type, ValueType::Flag);
        assert_eq!(app.parameter("MODE").unwrap().value_type, ValueType::Text);
        assert!(app.parameter("MODE").unwrap().enquote);
        assert_eq!(app.parameter("TAGS").unwrap().value_type, ValueType::List);
        assert_eq!(app.profile.node_count, Some(2));
    }
}
