//! The `ExecutableNode` trait: the contract every node must fulfil.

use async_trait::async_trait;
use serde_json::Value;

use crate::NodeError;

/// Shared context passed to every node during a single workflow run.
///
/// Defined here (in the nodes crate) so both the engine and individual node
/// implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Logical id of the definition being executed.
    pub definition_id: String,
    /// Version of the definition being executed.
    pub definition_version: u32,
    /// ID of the current execution run.
    pub execution_id: uuid::Uuid,
    /// Initial input supplied when the execution was triggered.
    pub input: Value,
}

/// The core node trait.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    /// Execute the node, receive the *previous* node's JSON output as `input`,
    /// and return this node's JSON output.
    ///
    /// `config` is the per-node configuration taken from the definition.
    async fn execute(
        &self,
        input: Value,
        config: &Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, NodeError>;
}
