use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

/// Writes the final result payload into the run's workspace.
pub struct ArtifactWriter {
    path: PathBuf,
}

impl ArtifactWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `payload` verbatim, replacing any previous artifact.
    pub async fn write(&self, payload: &str) -> Result<PathBuf> {
        tokio::fs::write(&self.path, payload)
            .await
            .map_err(|source| AppError::ArtifactWrite {
                path: self.path.clone(),
                source,
            })?;

        tracing::info!(path = %self.path.display(), bytes = payload.len(), "Wrote result artifact");
        Ok(self.path.clone())
    }
}
