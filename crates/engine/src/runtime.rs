//! The resolve → persist → invoke → materialize → persist handoff.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::invoker::Invoker;
use crate::materializer::{DefaultMaterializer, InstanceMaterializer};
use crate::models::Instance;
use crate::registry::DefinitionRegistry;
use crate::session::UnitOfWork;
use crate::store::{DefinitionStore, InstanceStore};
use crate::version::VersionQuery;
use crate::{ExecutionError, RuntimeError};

/// Wires the registry, the stores and an invoker together.
pub struct WorkflowRuntime {
    registry: Arc<DefinitionRegistry>,
    definitions: Arc<dyn DefinitionStore>,
    instances: Arc<dyn InstanceStore>,
    invoker: Arc<dyn Invoker>,
    materializer: Arc<dyn InstanceMaterializer>,
}

impl WorkflowRuntime {
    pub fn new(
        registry: Arc<DefinitionRegistry>,
        definitions: Arc<dyn DefinitionStore>,
        instances: Arc<dyn InstanceStore>,
        invoker: Arc<dyn Invoker>,
    ) -> Self {
        Self {
            registry,
            definitions,
            instances,
            invoker,
            materializer: Arc::new(DefaultMaterializer),
        }
    }

    pub fn with_materializer(mut self, materializer: Arc<dyn InstanceMaterializer>) -> Self {
        self.materializer = materializer;
        self
    }

    pub fn registry(&self) -> &Arc<DefinitionRegistry> {
        &self.registry
    }

    /// Open a unit of work over this runtime's stores.
    pub fn begin(&self) -> UnitOfWork {
        UnitOfWork::new(Arc::clone(&self.definitions), Arc::clone(&self.instances))
    }

    /// Resolve `definition_id` at `query`, run it with `input` and persist the
    /// resulting instance.
    ///
    /// Returns `Ok(None)` if no definition matches. The definition is saved
    /// before invocation when the store does not already hold that version;
    /// that save stays committed if the run or the instance save later fails.
    ///
    /// A run that fails is persisted as a `Failed` instance and reported as
    /// [`RuntimeError::Failed`]. A cancelled run persists nothing.
    #[instrument(skip(self, query, input, cancel), fields(query = %query))]
    pub async fn run(
        &self,
        definition_id: &str,
        query: VersionQuery,
        input: Value,
        cancel: &CancellationToken,
    ) -> Result<Option<Instance>, RuntimeError> {
        let Some(definition) = self
            .registry
            .get_definition(definition_id, query, cancel)
            .await?
        else {
            info!("no definition matched");
            return Ok(None);
        };

        let mut uow = self.begin();

        let stored = self
            .definitions
            .get_by_id(&definition.definition_id, VersionQuery::Exact(definition.version))
            .await?;
        if stored.is_none() {
            uow.save_definition(definition.as_ref().clone());
            uow.flush().await?;
        }

        let started_at = Utc::now();
        let result = match self
            .invoker
            .invoke(Arc::clone(&definition), input.clone(), cancel)
            .await
        {
            Ok(result) => result,
            Err(ExecutionError::Cancelled) => return Err(ExecutionError::Cancelled.into()),
            Err(e) => {
                let instance = self
                    .materializer
                    .materialize_failure(&definition, input, &e, started_at);
                uow.save_instance(instance.clone());
                if let Err(store_error) = uow.flush().await {
                    error!(error = %e, "could not record failed run");
                    return Err(store_error.into());
                }
                warn!(instance_id = %instance.id, error = %e, "run failed, instance recorded");
                return Err(RuntimeError::Failed {
                    instance: Box::new(instance),
                    source: e,
                });
            }
        };

        let instance = self.materializer.materialize(&result);
        uow.save_instance(instance.clone());
        uow.flush().await?;

        info!(
            instance_id = %instance.id,
            version = instance.definition_version,
            "instance persisted"
        );
        Ok(Some(instance))
    }
}
