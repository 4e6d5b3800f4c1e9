//! Version selection.
//!
//! [`select`] is the single selection contract shared by the registry and the
//! stores: filter the candidates of one definition id with the predicate of
//! the query mode, then order the survivors by version, highest first. A
//! point lookup takes the first element.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::Definition;

/// Which version(s) of a definition to retrieve.
///
/// Variant order is the precedence order used when a [`VersionFlags`] value
/// has more than one mode set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "version")]
pub enum VersionQuery {
    /// Unpublished definitions.
    Draft,
    /// The definition marked `is_latest`.
    Latest,
    /// Published definitions.
    Published,
    /// Definitions that are published or marked latest.
    LatestOrPublished,
    /// No filtering.
    AllVersions,
    /// Definitions with exactly this version number.
    Exact(u32),
}

impl VersionQuery {
    /// Whether `definition` satisfies this query's predicate.
    pub fn matches(&self, definition: &Definition) -> bool {
        match *self {
            Self::Draft => !definition.is_published,
            Self::Latest => definition.is_latest,
            Self::Published => definition.is_published,
            Self::LatestOrPublished => definition.is_published || definition.is_latest,
            Self::AllVersions => true,
            Self::Exact(version) => definition.version == version,
        }
    }
}

impl fmt::Display for VersionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Latest => write!(f, "latest"),
            Self::Published => write!(f, "published"),
            Self::LatestOrPublished => write!(f, "latest-or-published"),
            Self::AllVersions => write!(f, "all"),
            Self::Exact(v) => write!(f, "{v}"),
        }
    }
}

impl FromStr for VersionQuery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "latest" => Ok(Self::Latest),
            "published" => Ok(Self::Published),
            "latest-or-published" | "latest_or_published" => Ok(Self::LatestOrPublished),
            "all" | "all-versions" | "all_versions" => Ok(Self::AllVersions),
            other => {
                let digits = other.strip_prefix('v').unwrap_or(other);
                match digits.parse::<u32>() {
                    Ok(0) => Err("version numbers start at 1".to_string()),
                    Ok(v) => Ok(Self::Exact(v)),
                    Err(_) => Err(format!("unknown version query: {s}")),
                }
            }
        }
    }
}

/// Flag-shaped version selector, as it arrives from callers that set
/// booleans rather than pick a mode.
///
/// Converting to [`VersionQuery`] resolves conflicting flags with a fixed
/// precedence: draft, latest, published, latest-or-published, all versions,
/// then an exact version when `version > 0`. With nothing set the query
/// selects all versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionFlags {
    pub draft: bool,
    pub latest: bool,
    pub published: bool,
    pub latest_or_published: bool,
    pub all_versions: bool,
    pub version: u32,
}

impl From<VersionFlags> for VersionQuery {
    fn from(flags: VersionFlags) -> Self {
        let precedence = [
            (flags.draft, VersionQuery::Draft),
            (flags.latest, VersionQuery::Latest),
            (flags.published, VersionQuery::Published),
            (flags.latest_or_published, VersionQuery::LatestOrPublished),
            (flags.all_versions, VersionQuery::AllVersions),
        ];

        precedence
            .into_iter()
            .find(|(is_set, _)| *is_set)
            .map(|(_, query)| query)
            .unwrap_or(if flags.version > 0 {
                VersionQuery::Exact(flags.version)
            } else {
                VersionQuery::AllVersions
            })
    }
}

/// Keep the candidates matching `query`, highest version first.
///
/// Candidates are expected to share one `definition_id`. Two candidates with
/// the same version come out in unspecified relative order; registration
/// rejects such duplicates so this should not arise.
pub fn select<D>(candidates: impl IntoIterator<Item = D>, query: VersionQuery) -> Vec<D>
where
    D: Borrow<Definition>,
{
    let mut selected: Vec<D> = candidates
        .into_iter()
        .filter(|d| query.matches(d.borrow()))
        .collect();
    selected.sort_unstable_by(|a, b| b.borrow().version.cmp(&a.borrow().version));
    selected
}

/// The highest-versioned candidate matching `query`, if any.
pub fn select_first<D>(candidates: impl IntoIterator<Item = D>, query: VersionQuery) -> Option<D>
where
    D: Borrow<Definition>,
{
    candidates
        .into_iter()
        .filter(|d| query.matches(d.borrow()))
        .max_by_key(|d| d.borrow().version)
}
