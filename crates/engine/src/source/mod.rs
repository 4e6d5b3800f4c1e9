//! Definition sources: the origins the registry aggregates.
//!
//! Sources are handed to [`crate::DefinitionRegistry::new`] as an explicit
//! list at startup. Within one aggregation pass every source is fetched
//! concurrently; any failure fails the whole pass.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{models::Definition, SourceError};

pub mod code;
pub mod file;
pub mod mock;
pub mod store;

pub use code::CodeSource;
pub use file::FileSource;
pub use mock::MockSource;
pub use store::StoreSource;

/// Supplies a batch of definitions from one backing origin.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    /// Short label used in logs and errors.
    fn name(&self) -> &str;

    /// Fetch every definition this source currently knows about.
    ///
    /// Implementations should return [`SourceError::Cancelled`] promptly once
    /// `cancel` fires.
    async fn get_definitions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Definition>, SourceError>;
}
