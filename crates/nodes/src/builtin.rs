//! Built-in nodes available to every runtime.
//!
//! | node_type     | behaviour                                              |
//! |---------------|--------------------------------------------------------|
//! | `passthrough` | returns its input unchanged                            |
//! | `merge`       | shallow-merges the node's `config` object into input   |
//! | `log`         | emits the input at `info` level and passes it through  |

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::{ExecutableNode, ExecutionContext, NodeError};

/// Returns its input unchanged.
pub struct PassthroughNode;

#[async_trait]
impl ExecutableNode for PassthroughNode {
    async fn execute(
        &self,
        input: Value,
        _config: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<Value, NodeError> {
        Ok(input)
    }
}

/// Shallow-merges `config` into the input object. Keys from `config` win.
pub struct MergeNode;

#[async_trait]
impl ExecutableNode for MergeNode {
    async fn execute(
        &self,
        input: Value,
        config: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<Value, NodeError> {
        let Some(patch) = config.as_object() else {
            return Err(NodeError::Fatal(format!(
                "merge node expects an object config, got {config}"
            )));
        };

        let mut out = match input {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(NodeError::Fatal(format!(
                    "merge node expects an object input, got {other}"
                )))
            }
        };
        for (k, v) in patch {
            out.insert(k.clone(), v.clone());
        }
        Ok(Value::Object(out))
    }
}

/// Logs the input and passes it through.
pub struct LogNode;

#[async_trait]
impl ExecutableNode for LogNode {
    async fn execute(
        &self,
        input: Value,
        config: &Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, NodeError> {
        let label = config.get("label").and_then(Value::as_str).unwrap_or("log");
        info!(
            definition_id = %ctx.definition_id,
            version = ctx.definition_version,
            execution_id = %ctx.execution_id,
            "{label}: {input}"
        );
        Ok(input)
    }
}

/// The default `node_type` → implementation table.
pub fn builtin_nodes() -> HashMap<String, Arc<dyn ExecutableNode>> {
    let mut nodes: HashMap<String, Arc<dyn ExecutableNode>> = HashMap::new();
    nodes.insert("passthrough".into(), Arc::new(PassthroughNode));
    nodes.insert("merge".into(), Arc::new(MergeNode));
    nodes.insert("log".into(), Arc::new(LogNode));
    nodes
}
