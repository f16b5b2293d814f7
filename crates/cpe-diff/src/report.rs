//! Persistence of mismatched responses
//!
//! For every key whose responses differ, the raw old and new documents are
//! written side by side as `<vendor>#<product>.old` / `.new` so they can be
//! inspected with any diff tool after the run.

use crate::error::{HarnessError, HarnessResult};
use crate::sampler::ComparisonKey;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Separator between the two key fields in artifact names
pub const KEY_SEPARATOR: char = '#';

/// Paths of one written artifact pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub old: PathBuf,
    pub new: PathBuf,
}

/// Writes diff artifacts under a single output directory
#[derive(Debug, Clone)]
pub struct DiffReporter {
    dir: PathBuf,
}

impl DiffReporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Delete the output directory if present, then create it empty
    pub async fn reset(&self) -> HarnessResult<()> {
        if fs::try_exists(&self.dir).await.unwrap_or(false) {
            fs::remove_dir_all(&self.dir)
                .await
                .map_err(|source| self.persist_error(&self.dir, source))?;
        }
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| self.persist_error(&self.dir, source))?;
        debug!("Reset diff directory {:?}", self.dir);
        Ok(())
    }

    /// Artifact file stem for a key
    pub fn file_stem(key: &ComparisonKey) -> String {
        format!(
            "{}{}{}",
            escape_segment(&key.vendor),
            KEY_SEPARATOR,
            escape_segment(&key.product)
        )
    }

    pub fn paths_for(&self, key: &ComparisonKey) -> ArtifactPaths {
        let stem = Self::file_stem(key);
        ArtifactPaths {
            old: self.dir.join(format!("{stem}.old")),
            new: self.dir.join(format!("{stem}.new")),
        }
    }

    /// Write both documents as 4-space indented JSON
    pub async fn write(
        &self,
        key: &ComparisonKey,
        old: &Value,
        new: &Value,
    ) -> HarnessResult<ArtifactPaths> {
        let paths = self.paths_for(key);
        self.write_document(&paths.old, old).await?;
        self.write_document(&paths.new, new).await?;
        debug!(key = %key, "Wrote diff artifacts {:?}", paths);
        Ok(paths)
    }

    async fn write_document(&self, path: &Path, document: &Value) -> HarnessResult<()> {
        let content = to_pretty_json(document).map_err(|e| {
            self.persist_error(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;

        // Write to temp file first, then rename
        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        fs::write(&temp_path, content)
            .await
            .map_err(|source| self.persist_error(&temp_path, source))?;
        fs::rename(&temp_path, path)
            .await
            .map_err(|source| self.persist_error(path, source))
    }

    fn persist_error(&self, path: &Path, source: std::io::Error) -> HarnessError {
        HarnessError::Persist {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Serialize with a 4-space indent
pub fn to_pretty_json(value: &Value) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;
    Ok(buf)
}

/// Keep a key field inside the output directory
fn escape_segment(field: &str) -> String {
    field.replace('%', "%25").replace('/', "%2F")
}
