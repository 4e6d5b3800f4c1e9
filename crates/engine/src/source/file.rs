//! Definitions loaded from JSON files on disk.
//!
//! Every `*.json` file directly inside the directory is read on each pass.
//! A file holds either one definition object or an array of them. Files are
//! read in file-name order.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::source::DefinitionSource;
use crate::{models::Definition, SourceError};

#[derive(Deserialize)]
#[serde(untagged)]
enum DefinitionFile {
    Many(Vec<Definition>),
    One(Box<Definition>),
}

/// Reads definitions from a directory of JSON files.
pub struct FileSource {
    name: String,
    dir: PathBuf,
}

impl FileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            name: format!("file:{}", dir.display()),
            dir,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn unavailable(&self, message: String) -> SourceError {
        SourceError::Unavailable {
            source_name: self.name.clone(),
            message,
        }
    }

    fn invalid(&self, message: String) -> SourceError {
        SourceError::Invalid {
            source_name: self.name.clone(),
            message,
        }
    }

    async fn list_files(&self) -> Result<Vec<PathBuf>, SourceError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| self.unavailable(format!("cannot read {}: {e}", self.dir.display())))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| self.unavailable(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Parse the contents of one definition file.
pub fn parse_definitions(bytes: &[u8]) -> Result<Vec<Definition>, serde_json::Error> {
    Ok(match serde_json::from_slice::<DefinitionFile>(bytes)? {
        DefinitionFile::Many(definitions) => definitions,
        DefinitionFile::One(definition) => vec![*definition],
    })
}

#[async_trait]
impl DefinitionSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, cancel), fields(dir = %self.dir.display()))]
    async fn get_definitions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Definition>, SourceError> {
        let mut definitions = Vec::new();

        for path in self.list_files().await? {
            if cancel.is_cancelled() {
                return Err(SourceError::Cancelled);
            }

            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| self.unavailable(format!("cannot read {}: {e}", path.display())))?;
            let parsed = parse_definitions(&bytes)
                .map_err(|e| self.invalid(format!("{}: {e}", path.display())))?;

            if let Some(bad) = parsed.iter().find(|d| d.version == 0) {
                return Err(self.invalid(format!(
                    "{}: definition '{}' has version 0",
                    path.display(),
                    bad.definition_id
                )));
            }

            debug!(file = %path.display(), count = parsed.len(), "loaded definitions");
            definitions.extend(parsed);
        }

        Ok(definitions)
    }
}
