//! Definitions already persisted in a [`DefinitionStore`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::source::DefinitionSource;
use crate::store::DefinitionStore;
use crate::{models::Definition, SourceError};

/// Exposes every definition in a store to the registry.
///
/// Writes to the store do not invalidate the registry by themselves; trigger
/// [`crate::DefinitionRegistry::invalidate`] after changing stored definitions.
pub struct StoreSource {
    store: Arc<dyn DefinitionStore>,
}

impl StoreSource {
    pub fn new(store: Arc<dyn DefinitionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DefinitionSource for StoreSource {
    fn name(&self) -> &str {
        "store"
    }

    async fn get_definitions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Definition>, SourceError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SourceError::Cancelled),
            listed = self.store.list() => listed.map_err(|e| SourceError::Unavailable {
                source_name: self.name().to_owned(),
                message: e.to_string(),
            }),
        }
    }
}
