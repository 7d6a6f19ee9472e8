//! Flat-file script storage under a fixed base directory.
//!
//! One file per script at `<base>/<relative path>`. Re-uploading the same
//! filename overwrites the previous body; nothing is ever deleted here.

use std::path::{Path, PathBuf};

use tokio::fs;

use super::path::{resolve_within, ScriptPath};
use crate::error::CoreError;

/// A script body that has been written to disk.
#[derive(Debug, Clone)]
pub struct StoredScript {
    /// Canonical location, always inside the store's base directory.
    pub absolute_path: PathBuf,
    /// The validated upload filename.
    pub relative_path: ScriptPath,
    /// The exact text that was written.
    pub source: String,
}

/// Writes validated scripts beneath a canonical base directory.
#[derive(Debug, Clone)]
pub struct ScriptStore {
    base: PathBuf,
}

impl ScriptStore {
    /// Create the base directory if needed and canonicalize it.
    ///
    /// Containment checks compare against the canonical form, so a base
    /// reached through a symlink still works.
    pub async fn open(base: impl AsRef<Path>) -> Result<Self, CoreError> {
        fs::create_dir_all(base.as_ref()).await?;
        let base = fs::canonicalize(base.as_ref()).await?;
        Ok(Self { base })
    }

    /// Canonical base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Write `source` to `relative` under the base directory.
    ///
    /// Parent directories are created as needed. The text is written
    /// byte-for-byte (no newline translation), replacing any existing file.
    pub async fn persist(
        &self,
        relative: &ScriptPath,
        source: &str,
    ) -> Result<StoredScript, CoreError> {
        let destination = resolve_within(&self.base, relative).await?;

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&destination, source.as_bytes()).await?;

        tracing::debug!(
            path = %destination.display(),
            bytes = source.len(),
            "Script written to disk",
        );

        Ok(StoredScript {
            absolute_path: destination,
            relative_path: relative.clone(),
            source: source.to_string(),
        })
    }
}
