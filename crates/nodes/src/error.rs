//! Errors a node can report.

use thiserror::Error;

/// Returned from `ExecutableNode::execute`. The variant decides whether the
/// invoker tries the node again.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The node may succeed if re-run (timeouts, unavailable upstreams).
    #[error("retryable node error: {0}")]
    Retryable(String),

    /// Re-running cannot help. The run stops at this node.
    #[error("fatal node error: {0}")]
    Fatal(String),
}
