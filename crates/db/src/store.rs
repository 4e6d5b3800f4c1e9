//! Postgres-backed implementations of the engine's store traits.

use async_trait::async_trait;
use tracing::instrument;
use uuid::Uuid;

use engine::{Definition, DefinitionStore, Instance, InstanceStore, StoreError, VersionQuery};

use crate::models::{DefinitionRow, InstanceRow};
use crate::repository::{definitions, instances};
use crate::{DbError, DbPool};

/// Definitions and instances in one Postgres database.
///
/// Each call runs on its own pooled connection and commits on its own.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl DefinitionStore for PgStore {
    #[instrument(skip_all, fields(definition_id = %definition.definition_id, version = definition.version))]
    async fn save(&self, definition: &Definition) -> Result<(), StoreError> {
        let row = DefinitionRow::from_definition(definition)?;
        definitions::upsert_definition(&self.pool, &row).await?;
        Ok(())
    }

    async fn get_by_id(
        &self,
        definition_id: &str,
        query: VersionQuery,
    ) -> Result<Option<Definition>, StoreError> {
        let row = definitions::get_definition(&self.pool, definition_id, query).await?;
        Ok(row.map(Definition::try_from).transpose()?)
    }

    async fn list(&self) -> Result<Vec<Definition>, StoreError> {
        let rows = definitions::list_definitions(&self.pool).await?;
        let definitions = rows
            .into_iter()
            .map(Definition::try_from)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(definitions)
    }
}

#[async_trait]
impl InstanceStore for PgStore {
    #[instrument(skip_all, fields(instance_id = %instance.id))]
    async fn save(&self, instance: &Instance) -> Result<(), StoreError> {
        let row = InstanceRow::from_instance(instance)?;
        instances::insert_instance(&self.pool, &row).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Instance>, StoreError> {
        let row = instances::get_instance(&self.pool, id).await?;
        Ok(row.map(Instance::try_from).transpose()?)
    }

    async fn list_for_definition(&self, definition_id: &str) -> Result<Vec<Instance>, StoreError> {
        let rows = instances::list_instances_for_definition(&self.pool, definition_id).await?;
        let instances = rows
            .into_iter()
            .map(Instance::try_from)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(instances)
    }
}
