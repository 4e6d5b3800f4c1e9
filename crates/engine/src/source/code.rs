//! Definitions registered in code by the host process.

use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::REGISTRY_SIGNAL;
use crate::signal::Signal;
use crate::source::DefinitionSource;
use crate::{models::Definition, RegistrationError, SourceError};

/// An in-process list of definitions.
///
/// Every registrant action triggers the registry's invalidation channel, so
/// the next lookup sees the change without waiting for expiry.
pub struct CodeSource {
    definitions: RwLock<Vec<Definition>>,
    signal: Signal,
}

impl CodeSource {
    pub fn new(signal: Signal) -> Self {
        Self {
            definitions: RwLock::new(Vec::new()),
            signal,
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Definition>> {
        self.definitions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a definition.
    ///
    /// Registering a definition with `is_latest` set clears the flag on any
    /// other version of the same id.
    ///
    /// # Errors
    /// - [`RegistrationError::InvalidVersion`] for version 0.
    /// - [`RegistrationError::DuplicateVersion`] if `(definition_id, version)`
    ///   is already registered.
    pub fn register(&self, definition: Definition) -> Result<(), RegistrationError> {
        if definition.version == 0 {
            return Err(RegistrationError::InvalidVersion {
                definition_id: definition.definition_id,
            });
        }

        {
            let mut definitions = self.write();
            if definitions.iter().any(|d| d.key() == definition.key()) {
                return Err(RegistrationError::DuplicateVersion {
                    definition_id: definition.definition_id,
                    version: definition.version,
                });
            }
            if definition.is_latest {
                clear_latest(&mut definitions, &definition.definition_id);
            }
            info!(
                definition_id = %definition.definition_id,
                version = definition.version,
                "definition registered"
            );
            definitions.push(definition);
        }

        self.signal.trigger(REGISTRY_SIGNAL);
        Ok(())
    }

    /// Make `version` the latest of `definition_id`, clearing the previous one.
    pub fn mark_latest(&self, definition_id: &str, version: u32) -> Result<(), RegistrationError> {
        {
            let mut definitions = self.write();
            ensure_registered(&definitions, definition_id, version)?;
            clear_latest(&mut definitions, definition_id);
            for d in definitions.iter_mut().filter(|d| d.key() == (definition_id, version)) {
                d.is_latest = true;
            }
        }

        self.signal.trigger(REGISTRY_SIGNAL);
        Ok(())
    }

    /// Release `version` of `definition_id` for execution.
    pub fn publish(&self, definition_id: &str, version: u32) -> Result<(), RegistrationError> {
        {
            let mut definitions = self.write();
            ensure_registered(&definitions, definition_id, version)?;
            for d in definitions.iter_mut().filter(|d| d.key() == (definition_id, version)) {
                d.is_published = true;
            }
        }

        self.signal.trigger(REGISTRY_SIGNAL);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.definitions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn ensure_registered(
    definitions: &[Definition],
    definition_id: &str,
    version: u32,
) -> Result<(), RegistrationError> {
    if definitions.iter().any(|d| d.key() == (definition_id, version)) {
        Ok(())
    } else {
        Err(RegistrationError::UnknownVersion {
            definition_id: definition_id.to_owned(),
            version,
        })
    }
}

fn clear_latest(definitions: &mut [Definition], definition_id: &str) {
    for d in definitions
        .iter_mut()
        .filter(|d| d.definition_id == definition_id && d.is_latest)
    {
        debug!(definition_id, version = d.version, "clearing previous latest");
        d.is_latest = false;
    }
}

#[async_trait]
impl DefinitionSource for CodeSource {
    fn name(&self) -> &str {
        "code"
    }

    async fn get_definitions(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Definition>, SourceError> {
        Ok(self
            .definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
