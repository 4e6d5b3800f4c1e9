//! Definition registry.
//!
//! `DefinitionRegistry` answers "which definition is `id` at `query`?" from a
//! cached aggregate of every [`DefinitionSource`]:
//!
//! 1. Read the aggregate from the cache under [`REGISTRY_CACHE_KEY`],
//!    populating it if absent, expired or invalidated. Concurrent callers
//!    share one population.
//! 2. A population fetches from all sources concurrently. Any source failure
//!    fails the pass and nothing is cached. There is no fallback to the
//!    previous aggregate: a partial definition set could route a run to the
//!    wrong version.
//! 3. Filter to the requested id and apply [`crate::version::select`].
//!
//! The aggregate is invalidated by triggering [`REGISTRY_SIGNAL`] on the
//! registry's [`Signal`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheError, ExpiryPolicy, SignalCache};
use crate::models::Definition;
use crate::signal::Signal;
use crate::source::DefinitionSource;
use crate::version::{select, select_first, VersionQuery};
use crate::{RegistryError, SourceError};

/// Cache key of the full aggregate.
pub const REGISTRY_CACHE_KEY: &str = "workflow-registry";

/// Signal channel governing the aggregate.
pub const REGISTRY_SIGNAL: &str = "workflow-registry";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Expiry settings for the cached aggregate.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// The aggregate expires after this long without a lookup.
    pub sliding_expiration: Duration,
    /// The aggregate expires this long after it was built, however busy.
    pub absolute_expiration: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sliding_expiration: Duration::from_secs(60 * 60),
            absolute_expiration: Duration::from_secs(4 * 60 * 60),
        }
    }
}

impl From<&RegistryConfig> for ExpiryPolicy {
    fn from(config: &RegistryConfig) -> Self {
        Self {
            sliding: config.sliding_expiration,
            absolute: config.absolute_expiration,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// The union of every source's definitions from one aggregation pass,
/// grouped by definition id.
#[derive(Debug, Default)]
pub struct DefinitionSet {
    by_id: HashMap<String, Vec<Arc<Definition>>>,
}

impl DefinitionSet {
    /// Merge source batches in the order given. A `(definition_id, version)`
    /// pair seen again in a later batch is dropped with a warning.
    pub fn merge(batches: impl IntoIterator<Item = (String, Vec<Definition>)>) -> Self {
        let mut by_id: HashMap<String, Vec<Arc<Definition>>> = HashMap::new();

        for (source, definitions) in batches {
            for definition in definitions {
                let versions = by_id.entry(definition.definition_id.clone()).or_default();
                if versions.iter().any(|d| d.version == definition.version) {
                    warn!(
                        source = %source,
                        definition_id = %definition.definition_id,
                        version = definition.version,
                        "duplicate definition version ignored"
                    );
                    continue;
                }
                versions.push(Arc::new(definition));
            }
        }

        Self { by_id }
    }

    /// Every version of `definition_id`, unordered.
    pub fn candidates(&self, definition_id: &str) -> &[Arc<Definition>] {
        self.by_id
            .get(definition_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn definition_ids(&self) -> impl Iterator<Item = &str> {
        self.by_id.keys().map(String::as_str)
    }

    /// Total number of definitions across all ids.
    pub fn len(&self) -> usize {
        self.by_id.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

// ---------------------------------------------------------------------------
// DefinitionRegistry
// ---------------------------------------------------------------------------

pub struct DefinitionRegistry {
    sources: Arc<[Arc<dyn DefinitionSource>]>,
    cache: SignalCache<DefinitionSet, SourceError>,
    signal: Signal,
}

impl DefinitionRegistry {
    /// Create a registry over `sources`. Sources registered earlier win when
    /// two of them supply the same `(definition_id, version)`.
    pub fn new(
        sources: Vec<Arc<dyn DefinitionSource>>,
        signal: Signal,
        config: &RegistryConfig,
    ) -> Self {
        info!(
            sources = sources.len(),
            sliding = ?config.sliding_expiration,
            absolute = ?config.absolute_expiration,
            "definition registry created"
        );
        Self {
            sources: sources.into(),
            cache: SignalCache::new(signal.clone(), config.into()),
            signal,
        }
    }

    /// The signal the cached aggregate listens on.
    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    /// Force the next lookup to rebuild the aggregate.
    pub fn invalidate(&self) {
        self.signal.trigger(REGISTRY_SIGNAL);
    }

    /// Number of aggregation passes started so far.
    pub fn aggregation_passes(&self) -> u64 {
        self.cache.populations()
    }

    /// The highest-versioned definition of `definition_id` matching `query`.
    ///
    /// Returns `Ok(None)` when nothing matches.
    ///
    /// # Errors
    /// - [`RegistryError::Source`] if the aggregation pass this call ran or
    ///   joined failed.
    /// - [`RegistryError::Cancelled`] if `cancel` fired first. Other callers
    ///   sharing the pass are unaffected.
    #[instrument(skip(self, query, cancel), fields(query = %query))]
    pub async fn get_definition(
        &self,
        definition_id: &str,
        query: VersionQuery,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<Definition>>, RegistryError> {
        let aggregate = self.read_cache(cancel).await?;
        let found = select_first(aggregate.candidates(definition_id).iter().cloned(), query);
        debug!(found = ?found.as_ref().map(|d| d.version), "definition lookup");
        Ok(found)
    }

    /// Every version of `definition_id` matching `query`, highest first.
    #[instrument(skip(self, query, cancel), fields(query = %query))]
    pub async fn list_definitions(
        &self,
        definition_id: &str,
        query: VersionQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<Definition>>, RegistryError> {
        let aggregate = self.read_cache(cancel).await?;
        Ok(select(aggregate.candidates(definition_id).iter().cloned(), query))
    }

    async fn read_cache(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<DefinitionSet>, RegistryError> {
        let sources = Arc::clone(&self.sources);
        self.cache
            .get_or_populate(REGISTRY_CACHE_KEY, REGISTRY_SIGNAL, cancel, move |token| {
                aggregate(sources, token)
            })
            .await
            .map_err(|e| match e {
                CacheError::Populate(source) => RegistryError::Source(source),
                CacheError::Cancelled => RegistryError::Cancelled,
            })
    }
}

/// One aggregation pass: fan out to every source, join all, merge.
#[instrument(skip_all, fields(sources = sources.len()))]
async fn aggregate(
    sources: Arc<[Arc<dyn DefinitionSource>]>,
    cancel: CancellationToken,
) -> Result<DefinitionSet, SourceError> {
    let fetches = sources.iter().map(|source| {
        let cancel = cancel.clone();
        async move {
            let batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(SourceError::Cancelled),
                batch = source.get_definitions(&cancel) => batch,
            };
            match batch {
                Ok(definitions) => Ok((source.name().to_owned(), definitions)),
                Err(e) => {
                    warn!(source = source.name(), error = %e, "definition source failed");
                    Err(e)
                }
            }
        }
    });

    let batches = try_join_all(fetches).await?;
    let set = DefinitionSet::merge(batches);
    info!(definitions = set.len(), "definition aggregate rebuilt");
    Ok(set)
}
