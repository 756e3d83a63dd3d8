//! Persisted run metadata shared between workers
//!
//! The setup phase writes the file once per run; every worker reads it to
//! find the header message and the run thread. Writes go through a temp file
//! and a rename so a concurrent reader never sees a half-written document.

use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::RunMetadata;

/// Default location of the run metadata file, relative to the working dir
pub const DEFAULT_RUN_META_FILE: &str = ".discord-run.json";

/// Reads and writes [`RunMetadata`] at a well-known path
#[derive(Debug, Clone)]
pub struct RunMetadataStore {
    path: PathBuf,
}

impl Default for RunMetadataStore {
    fn default() -> Self {
        Self::new(DEFAULT_RUN_META_FILE)
    }
}

impl RunMetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the metadata, or `None` when the file is absent or unreadable.
    ///
    /// Workers call this before every flush attempt, so a missing file is the
    /// normal "setup has not finished yet" case and only logs at debug level.
    pub async fn load(&self) -> Option<RunMetadata> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %self.path.display(), "Run metadata not readable: {}", e);
                return None;
            }
        };
        match serde_json::from_slice::<RunMetadata>(&bytes) {
            Ok(meta) => Some(meta),
            Err(e) => {
                debug!(path = %self.path.display(), "Run metadata not parseable: {}", e);
                None
            }
        }
    }

    /// Read the metadata, failing when it does not exist
    pub fn load_required(&self) -> Result<RunMetadata> {
        if !self.path.exists() {
            return Err(Error::MetadataNotFound(self.path.display().to_string()));
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Atomically replace the metadata file. Safe to overwrite on every run.
    pub fn save(&self, meta: &RunMetadata) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(meta)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path)?;

        info!(path = %self.path.display(), thread_id = %meta.thread_id, "Run metadata written");
        Ok(())
    }

    /// Remove the metadata file if present
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> RunMetadata {
        RunMetadata {
            thread_id: "thread-1".into(),
            channel_id: "chan-1".into(),
            header_message_id: "msg-1".into(),
            suite_label: "End2End Test Suite: LOCAL | all".into(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = RunMetadataStore::new(dir.path().join("run.json"));
        assert!(store.load().await.is_none());
        assert!(matches!(store.load_required(), Err(Error::MetadataNotFound(_))));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = RunMetadataStore::new(dir.path().join("nested").join("run.json"));
        store.save(&sample()).unwrap();

        assert_eq!(store.load().await, Some(sample()));
        assert_eq!(store.load_required().unwrap(), sample());

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"headerMessageId\": \"msg-1\""));
    }

    #[tokio::test]
    async fn test_garbage_file_loads_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(RunMetadataStore::new(path).load().await.is_none());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = RunMetadataStore::new(dir.path().join("run.json"));
        store.save(&sample()).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
    }
}
