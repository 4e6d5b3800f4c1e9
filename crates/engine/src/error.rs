//! Engine-level error types.

use thiserror::Error;

use crate::models::Instance;

/// A definition source failed to produce its batch.
///
/// Clonable so that one failed aggregation pass can be reported to every
/// caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The source's backing origin could not be read.
    #[error("definition source '{source_name}' failed: {message}")]
    Unavailable { source_name: String, message: String },

    /// The source produced data that is not a valid definition.
    #[error("definition source '{source_name}' returned invalid data: {message}")]
    Invalid { source_name: String, message: String },

    /// The fetch was cancelled before it finished.
    #[error("definition source fetch was cancelled")]
    Cancelled,
}

/// Errors from `DefinitionRegistry` lookups. "No match" is not an error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A source failed during the aggregation pass this lookup depended on.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The caller's cancellation token fired.
    #[error("definition lookup was cancelled")]
    Cancelled,
}

/// Errors from registrant actions on a `CodeSource`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("definition '{definition_id}' version {version} is already registered")]
    DuplicateVersion { definition_id: String, version: u32 },

    #[error("definition '{definition_id}' has invalid version 0; versions start at 1")]
    InvalidVersion { definition_id: String },

    #[error("definition '{definition_id}' version {version} is not registered")]
    UnknownVersion { definition_id: String, version: u32 },
}

/// Errors produced while invoking a definition.
#[derive(Debug, Error)]
pub enum ExecutionError {
    // ------ Validation errors ------

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge references a node ID that doesn't exist in the definition.
    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// Topological sort detected a cycle.
    #[error("workflow graph contains a cycle")]
    CycleDetected,

    // ------ Execution errors ------

    /// No implementation is registered for a node's type.
    #[error("node '{node_id}' has unknown node_type '{node_type}'")]
    UnknownNodeType { node_id: String, node_type: String },

    /// A node failed with a fatal error; the whole run is aborted.
    #[error("node '{node_id}' failed fatally: {message}")]
    NodeFatal {
        node_id: String,
        message: String,
    },

    /// A node's retryable error was exhausted.
    #[error("node '{node_id}' exceeded retry limit: {message}")]
    NodeRetryExhausted {
        node_id: String,
        message: String,
    },

    /// The caller's cancellation token fired mid-run.
    #[error("execution was cancelled")]
    Cancelled,
}

/// A store call failed.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with this key already exists and the store refuses to overwrite.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// The record could not be encoded for, or decoded from, storage.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backing storage failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by `WorkflowRuntime::run`.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The run ended before producing a result and nothing was recorded.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// The run failed and was recorded as a `Failed` instance.
    #[error("run recorded as failed instance {id}: {source}", id = .instance.id)]
    Failed {
        instance: Box<Instance>,
        source: ExecutionError,
    },

    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}
