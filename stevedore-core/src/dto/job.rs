//! Job DTOs for the submission surface

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::job::{ExecutionProfile, InputValue, ParameterValue};

/// Request to submit a new job
///
/// Produced by the (external) API layer and consumed by the job manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJob {
    /// Caller-supplied id; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub owner: String,
    pub token: String,
    pub name: String,
    pub app_id: String,
    #[serde(default)]
    pub inputs: HashMap<String, InputValue>,
    #[serde(default)]
    pub parameters: HashMap<String, ParameterValue>,
    #[serde(default)]
    pub profile: Option<ExecutionProfile>,
}
