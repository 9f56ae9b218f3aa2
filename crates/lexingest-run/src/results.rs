//! Persisted run results: one `{command}_{provider}.json` per pair, always
//! holding the latest run.

use std::io::Write;
use std::path::{Path, PathBuf};

use lexingest_core::{Command, RunResult};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ResultStoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid result file {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Directory of run-result files.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, command: &str, provider: &str) -> PathBuf {
        self.dir.join(format!("{command}_{provider}.json"))
    }

    /// Replace the stored result for the run's pair.
    ///
    /// The file is written in full to a temporary file in the same directory
    /// and renamed over the target, so readers never see a partial result.
    pub fn write(&self, result: &RunResult) -> Result<PathBuf, ResultStoreError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ResultStoreError::Io { path, source }
        };
        std::fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;

        let target = self.path_for(&result.command, &result.provider);
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_err(&self.dir))?;
        serde_json::to_writer_pretty(&mut tmp, result).map_err(|source| {
            ResultStoreError::Json {
                path: target.clone(),
                source,
            }
        })?;
        writeln!(tmp).map_err(io_err(tmp.path()))?;
        tmp.persist(&target).map_err(|e| ResultStoreError::Io {
            path: target.clone(),
            source: e.error,
        })?;
        Ok(target)
    }

    /// Stored result for one pair, if any.
    pub fn read(
        &self,
        command: Command,
        provider: &str,
    ) -> Result<Option<RunResult>, ResultStoreError> {
        let path = self.path_for(command.as_str(), provider);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ResultStoreError::Io { path, source }),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| ResultStoreError::Json { path, source })
    }

    /// Every readable result in the directory, sorted by (command, provider).
    ///
    /// Unreadable and malformed files are skipped; a missing directory is
    /// simply empty.
    pub fn read_all(&self) -> Vec<RunResult> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut results: Vec<RunResult> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| {
                let text = std::fs::read_to_string(&path).ok()?;
                serde_json::from_str(&text)
                    .inspect_err(|e| debug!(path = %path.display(), error = %e, "skipping result file"))
                    .ok()
            })
            .collect();
        results.sort_by(|a, b| (&a.command, &a.provider).cmp(&(&b.command, &b.provider)));
        results
    }
}
