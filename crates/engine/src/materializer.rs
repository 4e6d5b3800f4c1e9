//! Turning the outcome of a run into a persistable `Instance`.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{Definition, ExecutionResult, Instance, InstanceStatus};
use crate::ExecutionError;

/// Builds the durable record for a finished run.
pub trait InstanceMaterializer: Send + Sync {
    fn materialize(&self, result: &ExecutionResult) -> Instance;

    /// Record for a run that failed before producing a result. The output
    /// carries the error message under `"error"`.
    fn materialize_failure(
        &self,
        definition: &Definition,
        input: Value,
        error: &ExecutionError,
        started_at: DateTime<Utc>,
    ) -> Instance {
        Instance {
            id: Uuid::new_v4(),
            definition_id: definition.definition_id.clone(),
            definition_version: definition.version,
            status: InstanceStatus::Failed,
            input,
            output: json!({ "error": error.to_string() }),
            steps: Vec::new(),
            started_at,
            finished_at: Some(Utc::now()),
        }
    }
}

/// Copies the run one-to-one. The instance id is the execution id, so a run
/// can be looked up by the id the invoker logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMaterializer;

impl InstanceMaterializer for DefaultMaterializer {
    fn materialize(&self, result: &ExecutionResult) -> Instance {
        Instance {
            id: result.execution_id,
            definition_id: result.definition_id.clone(),
            definition_version: result.definition_version,
            status: InstanceStatus::Succeeded,
            input: result.input.clone(),
            output: result.output.clone(),
            steps: result.steps.clone(),
            started_at: result.started_at,
            finished_at: Some(result.finished_at),
        }
    }
}

impl From<&ExecutionResult> for Instance {
    fn from(result: &ExecutionResult) -> Self {
        DefaultMaterializer.materialize(result)
    }
}
