//! Unit of work over the definition and instance stores.
//!
//! Writes are staged with `save_*` and committed by [`UnitOfWork::flush`], in
//! staging order, each as its own commit. A failed write stops the flush and
//! is discarded: its error is the caller's to handle, and it is never
//! resubmitted. Earlier writes remain committed and later ones stay pending.
//!
//! Dropping a unit of work with pending writes (an early return or a
//! cancelled future) hands them to a background task on the current Tokio
//! runtime. Without a runtime they are logged and lost.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::models::{Definition, Instance};
use crate::store::{DefinitionStore, InstanceStore};
use crate::StoreError;

enum PendingWrite {
    Definition(Definition),
    Instance(Instance),
}

impl PendingWrite {
    async fn apply(
        &self,
        definitions: &dyn DefinitionStore,
        instances: &dyn InstanceStore,
    ) -> Result<(), StoreError> {
        match self {
            Self::Definition(definition) => definitions.save(definition).await,
            Self::Instance(instance) => instances.save(instance).await,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Definition(d) => format!("definition {}@{}", d.definition_id, d.version),
            Self::Instance(i) => format!("instance {}", i.id),
        }
    }
}

pub struct UnitOfWork {
    definitions: Arc<dyn DefinitionStore>,
    instances: Arc<dyn InstanceStore>,
    pending: VecDeque<PendingWrite>,
}

impl UnitOfWork {
    pub fn new(definitions: Arc<dyn DefinitionStore>, instances: Arc<dyn InstanceStore>) -> Self {
        Self {
            definitions,
            instances,
            pending: VecDeque::new(),
        }
    }

    pub fn save_definition(&mut self, definition: Definition) {
        self.pending.push_back(PendingWrite::Definition(definition));
    }

    pub fn save_instance(&mut self, instance: Instance) {
        self.pending.push_back(PendingWrite::Instance(instance));
    }

    /// Number of staged, uncommitted writes.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Commit staged writes in order. Returns how many were committed.
    ///
    /// On error the failed write has already been removed from the queue.
    pub async fn flush(&mut self) -> Result<usize, StoreError> {
        let mut committed = 0;
        while let Some(write) = self.pending.pop_front() {
            if let Err(e) = write
                .apply(self.definitions.as_ref(), self.instances.as_ref())
                .await
            {
                warn!(remaining = self.pending.len(), "discarding {} after failed commit", write.describe());
                return Err(e);
            }
            debug!("committed {}", write.describe());
            committed += 1;
        }
        Ok(committed)
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let pending = std::mem::take(&mut self.pending);
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            error!(count = pending.len(), "unit of work dropped outside a runtime, writes lost");
            return;
        };

        warn!(count = pending.len(), "unit of work dropped with pending writes, flushing in background");
        let definitions = Arc::clone(&self.definitions);
        let instances = Arc::clone(&self.instances);
        handle.spawn(async move {
            for write in pending {
                if let Err(e) = write.apply(definitions.as_ref(), instances.as_ref()).await {
                    error!("background flush of {} failed: {}", write.describe(), e);
                }
            }
        });
    }
}
