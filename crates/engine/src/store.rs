//! Persistence contracts consumed by the runtime, and in-memory
//! implementations of them.
//!
//! Durable implementations live in the `db` crate.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Definition, Instance};
use crate::version::{select_first, VersionQuery};
use crate::StoreError;

/// Durable storage for definitions.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    /// Insert or replace the record for `(definition_id, version)`.
    /// Saving the same pair twice leaves exactly one record.
    async fn save(&self, definition: &Definition) -> Result<(), StoreError>;

    /// The highest version of `definition_id` matching `query`.
    async fn get_by_id(
        &self,
        definition_id: &str,
        query: VersionQuery,
    ) -> Result<Option<Definition>, StoreError>;

    /// Every stored definition.
    async fn list(&self) -> Result<Vec<Definition>, StoreError>;
}

/// Durable storage for run records.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Append a new instance. Instance ids are unique.
    async fn save(&self, instance: &Instance) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Instance>, StoreError>;

    /// Instances of every version of `definition_id`, oldest first.
    async fn list_for_definition(&self, definition_id: &str) -> Result<Vec<Instance>, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory stores
// ---------------------------------------------------------------------------

/// Definitions kept in process memory, keyed by `(definition_id, version)`.
#[derive(Debug, Default)]
pub struct MemoryDefinitionStore {
    definitions: RwLock<BTreeMap<(String, u32), Definition>>,
}

impl MemoryDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.definitions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.definitions.read().await.is_empty()
    }
}

#[async_trait]
impl DefinitionStore for MemoryDefinitionStore {
    async fn save(&self, definition: &Definition) -> Result<(), StoreError> {
        let key = (definition.definition_id.clone(), definition.version);
        let replaced = self
            .definitions
            .write()
            .await
            .insert(key, definition.clone())
            .is_some();
        debug!(
            definition_id = %definition.definition_id,
            version = definition.version,
            replaced,
            "definition saved"
        );
        Ok(())
    }

    async fn get_by_id(
        &self,
        definition_id: &str,
        query: VersionQuery,
    ) -> Result<Option<Definition>, StoreError> {
        let definitions = self.definitions.read().await;
        let candidates = definitions
            .values()
            .filter(|d| d.definition_id == definition_id);
        Ok(select_first(candidates, query).cloned())
    }

    async fn list(&self) -> Result<Vec<Definition>, StoreError> {
        Ok(self.definitions.read().await.values().cloned().collect())
    }
}

/// Instances kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryInstanceStore {
    instances: RwLock<HashMap<Uuid, Instance>>,
}

impl MemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }
}

#[async_trait]
impl InstanceStore for MemoryInstanceStore {
    async fn save(&self, instance: &Instance) -> Result<(), StoreError> {
        let mut instances = self.instances.write().await;
        if instances.contains_key(&instance.id) {
            return Err(StoreError::Duplicate(format!("instance {}", instance.id)));
        }
        instances.insert(instance.id, instance.clone());
        debug!(instance_id = %instance.id, "instance saved");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Instance>, StoreError> {
        Ok(self.instances.read().await.get(&id).cloned())
    }

    async fn list_for_definition(&self, definition_id: &str) -> Result<Vec<Instance>, StoreError> {
        let mut found: Vec<Instance> = self
            .instances
            .read()
            .await
            .values()
            .filter(|i| i.definition_id == definition_id)
            .cloned()
            .collect();
        found.sort_by_key(|i| i.started_at);
        Ok(found)
    }
}
