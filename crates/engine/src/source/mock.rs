//! `MockSource`: a test double for `DefinitionSource`.
//!
//! Counts calls, and can be told to wait or fail, so tests can observe how
//! often the registry aggregates and how it reacts to slow or broken origins.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::source::DefinitionSource;
use crate::{models::Definition, SourceError};

pub struct MockSource {
    name: String,
    definitions: Mutex<Vec<Definition>>,
    delay: Mutex<Option<Duration>>,
    failure: Mutex<Option<String>>,
    calls: AtomicUsize,
    cancellations: AtomicUsize,
}

impl MockSource {
    pub fn new(name: impl Into<String>, definitions: Vec<Definition>) -> Self {
        Self {
            name: name.into(),
            definitions: Mutex::new(definitions),
            delay: Mutex::new(None),
            failure: Mutex::new(None),
            calls: AtomicUsize::new(0),
            cancellations: AtomicUsize::new(0),
        }
    }

    /// Wait this long before answering each call.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = Some(delay);
        self
    }

    /// Fail every call with `message` until [`MockSource::recover`] is called.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.into());
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn push(&self, definition: Definition) {
        self.definitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(definition);
    }

    /// Number of times `get_definitions` has been called.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of calls that ended because their token was cancelled.
    pub fn cancelled_count(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DefinitionSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_definitions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Definition>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.cancellations.fetch_add(1, Ordering::SeqCst);
                    return Err(SourceError::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let failure = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(message) = failure {
            return Err(SourceError::Unavailable {
                source_name: self.name.clone(),
                message,
            });
        }

        Ok(self
            .definitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
