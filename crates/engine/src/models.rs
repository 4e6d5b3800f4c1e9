//! Core domain models for the workflow runtime.
//!
//! A [`Definition`] is immutable once constructed; the registry shares it by
//! `Arc` across readers and never mutates one in place. Only registrant
//! actions (see [`crate::source::CodeSource`]) produce new values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// NodeDefinition / Edge
// ---------------------------------------------------------------------------

/// A single step in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique identifier within this definition (referenced by edges).
    pub id: String,
    /// Maps to a registered `ExecutableNode` implementation.
    pub node_type: String,
    /// Arbitrary configuration passed to the node at execution time.
    #[serde(default)]
    pub config: Value,
}

/// Directed edge from one node to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

/// A named, versioned workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    /// Stable logical identifier, shared across versions.
    pub definition_id: String,
    /// Positive, monotonically increasing per `definition_id`.
    pub version: u32,
    /// Set by the registrant on the current version. At most one per id.
    #[serde(default)]
    pub is_latest: bool,
    /// Set once the version has been released for execution.
    #[serde(default)]
    pub is_published: bool,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Definition {
    /// An empty draft: not latest, not published, no nodes.
    pub fn new(definition_id: impl Into<String>, version: u32, name: impl Into<String>) -> Self {
        Self {
            definition_id: definition_id.into(),
            version,
            is_latest: false,
            is_published: false,
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn latest(mut self, is_latest: bool) -> Self {
        self.is_latest = is_latest;
        self
    }

    pub fn published(mut self, is_published: bool) -> Self {
        self.is_published = is_published;
        self
    }

    /// Replace the workflow body.
    pub fn with_graph(mut self, nodes: Vec<NodeDefinition>, edges: Vec<Edge>) -> Self {
        self.nodes = nodes;
        self.edges = edges;
        self
    }

    /// The `(definition_id, version)` pair identifying this record.
    pub fn key(&self) -> (&str, u32) {
        (self.definition_id.as_str(), self.version)
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// One node's contribution to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub node_id: String,
    pub input: Value,
    pub output: Value,
    /// Number of attempts, including the successful one.
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// The terminal state of a single run, produced by an `Invoker`.
///
/// Owned by the caller of `invoke` for one call; never cached.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub definition_id: String,
    pub definition_version: u32,
    pub input: Value,
    /// The JSON output produced by the *last* node in the sorted order.
    pub output: Value,
    pub steps: Vec<StepRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Instance
// ---------------------------------------------------------------------------

/// Outcome of a finished run. Instances are only written once a run has
/// ended, so there is no in-progress state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Succeeded,
    Failed,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for InstanceStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(Self::Succeeded),
            "failed"    => Ok(Self::Failed),
            other       => Err(format!("unknown instance status: {other}")),
        }
    }
}

/// Durable record of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: Uuid,
    pub definition_id: String,
    pub definition_version: u32,
    pub status: InstanceStatus,
    pub input: Value,
    pub output: Value,
    pub steps: Vec<StepRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
