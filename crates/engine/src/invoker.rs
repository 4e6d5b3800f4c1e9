//! Definition invocation.
//!
//! [`Invoker`] is the seam between the registry/store layers and whatever
//! actually runs a workflow. [`WorkflowInvoker`] is the built-in
//! implementation:
//! 1. Validates the graph and produces a topological ordering.
//! 2. Checks every node's `node_type` has an implementation before running.
//! 3. Walks the nodes in order, dispatching each via `ExecutableNode` and
//!    passing the previous node's JSON output as the next node's input.
//! 4. Retries `NodeError::Retryable` (up to `max_retries`, exponential
//!    back-off) and aborts on `NodeError::Fatal`.
//! 5. Honours cancellation before each node and during back-off.
//!
//! A `Definition` is immutable, so the same one may be invoked from any
//! number of tasks at once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use nodes::{ExecutableNode, ExecutionContext, NodeError};

use crate::dag::validate_dag;
use crate::models::{Definition, ExecutionResult, StepRecord};
use crate::ExecutionError;

/// Runs a resolved definition to a terminal result.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(
        &self,
        definition: Arc<Definition>,
        input: Value,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionError>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the invoker.
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// Maximum number of times a retryable node failure will be retried.
    pub max_retries: u32,
    /// Base delay for exponential back-off between retries.
    pub retry_base_delay: Duration,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
        }
    }
}

/// Maps `node_type` strings to `ExecutableNode` implementations.
pub type NodeRegistry = HashMap<String, Arc<dyn ExecutableNode>>;

// ---------------------------------------------------------------------------
// WorkflowInvoker
// ---------------------------------------------------------------------------

/// Stateless graph walker. One per process is enough.
pub struct WorkflowInvoker {
    nodes: NodeRegistry,
    config: InvokerConfig,
}

impl WorkflowInvoker {
    pub fn new(nodes: NodeRegistry, config: InvokerConfig) -> Self {
        Self { nodes, config }
    }

    fn resolve_nodes<'a>(
        &'a self,
        definition: &'a Definition,
        order: &[String],
    ) -> Result<Vec<(&'a str, &'a Value, &'a dyn ExecutableNode)>, ExecutionError> {
        let by_id: HashMap<&str, _> = definition
            .nodes
            .iter()
            .map(|n| (n.id.as_str(), n))
            .collect();

        order
            .iter()
            .filter_map(|id| by_id.get(id.as_str()).copied())
            .map(|node| {
                let implementation = self.nodes.get(&node.node_type).ok_or_else(|| {
                    ExecutionError::UnknownNodeType {
                        node_id: node.id.clone(),
                        node_type: node.node_type.clone(),
                    }
                })?;
                Ok((node.id.as_str(), &node.config, implementation.as_ref()))
            })
            .collect()
    }

    /// Run one node, retrying retryable failures. Returns the output and the
    /// number of attempts it took.
    async fn execute_with_retry(
        &self,
        node_id: &str,
        node: &dyn ExecutableNode,
        input: &Value,
        config: &Value,
        ctx: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<(Value, u32), ExecutionError> {
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match node.execute(input.clone(), config, ctx).await {
                Ok(output) => return Ok((output, attempts)),

                Err(NodeError::Fatal(msg)) => {
                    return Err(ExecutionError::NodeFatal {
                        node_id: node_id.to_owned(),
                        message: msg,
                    });
                }

                Err(NodeError::Retryable(msg)) => {
                    let retries = attempts - 1;
                    if retries >= self.config.max_retries {
                        return Err(ExecutionError::NodeRetryExhausted {
                            node_id: node_id.to_owned(),
                            message: msg,
                        });
                    }

                    let delay = backoff_delay(self.config.retry_base_delay, retries);

                    warn!(
                        "node '{}' retryable error (retry {}/{}), retrying in {:?}: {}",
                        node_id, retries + 1, self.config.max_retries, delay, msg
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ExecutionError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

/// `base * 2^retries`, saturating at `Duration::MAX`.
pub(crate) fn backoff_delay(base: Duration, retries: u32) -> Duration {
    base.checked_mul(2u32.saturating_pow(retries))
        .unwrap_or(Duration::MAX)
}

#[async_trait]
impl Invoker for WorkflowInvoker {
    #[instrument(
        skip_all,
        fields(definition_id = %definition.definition_id, version = definition.version)
    )]
    async fn invoke(
        &self,
        definition: Arc<Definition>,
        input: Value,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionError> {
        let order = validate_dag(&definition)?;
        let plan = self.resolve_nodes(&definition, &order)?;
        info!("graph validated, executing {} nodes in order: {:?}", order.len(), order);

        let execution_id = Uuid::new_v4();
        let started_at = Utc::now();
        let ctx = ExecutionContext {
            definition_id: definition.definition_id.clone(),
            definition_version: definition.version,
            execution_id,
            input: input.clone(),
        };

        let mut steps = Vec::with_capacity(plan.len());
        let mut current = input.clone();

        for (node_id, config, node) in plan {
            if cancel.is_cancelled() {
                warn!(%execution_id, "execution cancelled before node '{}'", node_id);
                return Err(ExecutionError::Cancelled);
            }

            let step_started = Utc::now();
            match self
                .execute_with_retry(node_id, node, &current, config, &ctx, cancel)
                .await
            {
                Ok((output, attempts)) => {
                    info!("node '{}' succeeded", node_id);
                    steps.push(StepRecord {
                        node_id: node_id.to_owned(),
                        input: std::mem::replace(&mut current, output.clone()),
                        output,
                        attempts,
                        started_at: step_started,
                        finished_at: Utc::now(),
                    });
                }
                Err(e) => {
                    error!(%execution_id, "node '{}' failed: {}", node_id, e);
                    return Err(e);
                }
            }
        }

        info!(%execution_id, "execution succeeded");

        Ok(ExecutionResult {
            execution_id,
            definition_id: definition.definition_id.clone(),
            definition_version: definition.version,
            input,
            output: current,
            steps,
            started_at,
            finished_at: Utc::now(),
        })
    }
}
