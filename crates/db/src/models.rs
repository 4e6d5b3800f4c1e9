//! Row structs that map 1-to-1 onto database tables, and their conversions
//! to and from the engine's domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use engine::models::{Definition, Edge, Instance, NodeDefinition, StepRecord};

use crate::DbError;

fn to_column(version: u32) -> Result<i32, DbError> {
    i32::try_from(version).map_err(|_| DbError::VersionOutOfRange(version.into()))
}

fn from_column(version: i32) -> Result<u32, DbError> {
    match u32::try_from(version) {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(DbError::VersionOutOfRange(version.into())),
    }
}

// ---------------------------------------------------------------------------
// workflow_definitions
// ---------------------------------------------------------------------------

/// The graph part of a definition, stored in the `body` JSONB column.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DefinitionBody {
    #[serde(default)]
    nodes: Vec<NodeDefinition>,
    #[serde(default)]
    edges: Vec<Edge>,
}

/// A persisted workflow definition row.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DefinitionRow {
    pub definition_id: String,
    pub version: i32,
    pub is_latest: bool,
    pub is_published: bool,
    pub name: String,
    pub description: Option<String>,
    /// `{ "nodes": [...], "edges": [...] }`
    pub body: serde_json::Value,
}

impl DefinitionRow {
    pub fn from_definition(definition: &Definition) -> Result<Self, DbError> {
        let body = DefinitionBody {
            nodes: definition.nodes.clone(),
            edges: definition.edges.clone(),
        };
        Ok(Self {
            definition_id: definition.definition_id.clone(),
            version: to_column(definition.version)?,
            is_latest: definition.is_latest,
            is_published: definition.is_published,
            name: definition.name.clone(),
            description: definition.description.clone(),
            body: serde_json::to_value(body)?,
        })
    }
}

impl TryFrom<DefinitionRow> for Definition {
    type Error = DbError;

    fn try_from(row: DefinitionRow) -> Result<Self, Self::Error> {
        let body: DefinitionBody = serde_json::from_value(row.body)?;
        let mut definition = Definition::new(row.definition_id, from_column(row.version)?, row.name)
            .latest(row.is_latest)
            .published(row.is_published)
            .with_graph(body.nodes, body.edges);
        definition.description = row.description;
        Ok(definition)
    }
}

// ---------------------------------------------------------------------------
// workflow_instances
// ---------------------------------------------------------------------------

/// A persisted workflow instance row.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct InstanceRow {
    pub id: Uuid,
    pub definition_id: String,
    pub definition_version: i32,
    pub status: String,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    /// Serialized `Vec<StepRecord>`.
    pub steps: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl InstanceRow {
    pub fn from_instance(instance: &Instance) -> Result<Self, DbError> {
        Ok(Self {
            id: instance.id,
            definition_id: instance.definition_id.clone(),
            definition_version: to_column(instance.definition_version)?,
            status: instance.status.to_string(),
            input: instance.input.clone(),
            output: instance.output.clone(),
            steps: serde_json::to_value(&instance.steps)?,
            started_at: instance.started_at,
            finished_at: instance.finished_at,
        })
    }
}

impl TryFrom<InstanceRow> for Instance {
    type Error = DbError;

    fn try_from(row: InstanceRow) -> Result<Self, Self::Error> {
        let steps: Vec<StepRecord> = serde_json::from_value(row.steps)?;
        Ok(Instance {
            id: row.id,
            definition_id: row.definition_id,
            definition_version: from_column(row.definition_version)?,
            status: row.status.parse().map_err(DbError::InvalidValue)?,
            input: row.input,
            output: row.output,
            steps,
            started_at: row.started_at,
            finished_at: row.finished_at,
        })
    }
}
