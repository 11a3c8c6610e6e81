//! Persisted availability state.
//!
//! The state file is a JSON object mapping lower-cased product names to the
//! last availability seen for them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Last-known availability per product identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockState(BTreeMap<String, bool>);

impl StockState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Availability for `identity`; unknown products count as unavailable.
    pub fn is_available(&self, identity: &str) -> bool {
        self.0.get(identity).copied().unwrap_or(false)
    }

    pub fn set(&mut self, identity: impl Into<String>, available: bool) {
        self.0.insert(identity.into(), available);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, bool)> for StockState {
    fn from_iter<I: IntoIterator<Item = (K, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the previous state. Missing or unreadable state is a cold start.
    async fn load(&self) -> StockState;

    /// Replace the persisted state.
    async fn save(&self, state: &StockState) -> Result<(), StoreError>;
}

/// Stores state as pretty-printed JSON in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self) -> StockState {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Could not load previous state. Starting fresh.");
                return StockState::new();
            }
        };

        match serde_json::from_str::<StockState>(&raw) {
            Ok(state) => {
                tracing::info!(path = %self.path.display(), products = state.len(), "Loaded previous stock status");
                state
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Could not parse previous state. Starting fresh.");
                StockState::new()
            }
        }
    }

    async fn save(&self, state: &StockState) -> Result<(), StoreError> {
        let mut json = serde_json::to_string_pretty(state)?;
        json.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| self.io_error(e))?;
        }

        // Write next to the target so the rename stays on one filesystem.
        let temp = self.temp_path();
        let mut file = fs::File::create(&temp).await.map_err(|e| self.io_error(e))?;
        file.write_all(json.as_bytes()).await.map_err(|e| self.io_error(e))?;
        file.sync_all().await.map_err(|e| self.io_error(e))?;
        drop(file);

        if let Err(e) = fs::rename(&temp, &self.path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(self.io_error(e));
        }

        tracing::info!(path = %self.path.display(), products = state.len(), "Saved current stock status");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("stock_status.json"));

        let state: StockState = [
            ("amul high protein paneer, 400 g | pack of 2", true),
            ("amul whey protein, 32 g | pack of 30 sachets", false),
            ("", true),
            ("ÜNICODE ✓", false),
        ]
        .into_iter()
        .collect();

        store.save(&state).await.unwrap();
        assert_eq!(store.load().await, state);
    }

    #[tokio::test]
    async fn empty_state_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));

        store.save(&StockState::new()).await.unwrap();
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_cold_start() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_cold_start() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{\"truncated\": tr").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(store.load().await.is_empty());

        std::fs::write(&path, "{\"count\": 3}").unwrap();
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn save_overwrites_and_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let store = JsonFileStore::new(&path);

        store.save(&[("x", true)].into_iter().collect()).await.unwrap();
        store.save(&[("y", false)].into_iter().collect()).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "{\n  \"y\": false\n}\n");
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn unknown_identity_is_unavailable() {
        let state: StockState = [("x", true)].into_iter().collect();
        assert!(state.is_available("x"));
        assert!(!state.is_available("y"));
    }
}
