// SPDX-License-Identifier: Apache-2.0
//! Operator configuration (`config.json`): a small `ConfigStore` /
//! `ConfigService` split so the storage mechanism and the serialised shape
//! can vary independently.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, ScribeError};

/// Storage port for a single raw config blob.
pub trait ConfigStore {
    /// Load the raw bytes. Returns [`ScribeError::NotFound`] when absent.
    fn load_raw(&self) -> Result<Vec<u8>>;
    /// Persist raw bytes, overwriting any prior content.
    fn save_raw(&self, data: &[u8]) -> Result<()>;
}

/// A [`ConfigStore`] backed by a single file on disk.
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    /// Point the store at `path` (not read or created until first use).
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigStore for FileConfigStore {
    fn load_raw(&self) -> Result<Vec<u8>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ScribeError::NotFound(self.path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save_raw(&self, data: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, data)?;
        Ok(())
    }
}

/// Thin service that (de)serialises a typed config value through a
/// [`ConfigStore`].
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Wrap `store`.
    pub const fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: ConfigStore> ConfigService<S> {
    /// Load and deserialize the config. Returns `Ok(None)` if absent.
    ///
    /// # Errors
    /// Returns [`ScribeError::JsonParse`] if the stored bytes are not
    /// valid JSON for `T`.
    pub fn load<T: for<'de> Deserialize<'de>>(&self) -> Result<Option<T>> {
        match self.store.load_raw() {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(ScribeError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Serialize and persist `value`.
    ///
    /// # Errors
    /// Returns [`ScribeError::Io`] if the write fails.
    pub fn save<T: Serialize>(&self, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(&bytes)
    }
}

/// The shape of `config.json`: operator-supplied repository configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Default author id used by manual commits.
    pub author_id: String,
    /// Default author role used by manual commits.
    pub author_role: String,
    /// Connection string for the upstream PostgreSQL database, if CDC
    /// ingestion is configured.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pg_connection_string: Option<String>,
    /// Tables the CDC ingestion loop should watch.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub watched_tables: Vec<String>,
}

impl RepoConfig {
    /// A config identical to the one `scribe_repo_init` writes by default
    /// in the reference implementation.
    #[must_use]
    pub fn anonymous_default() -> Self {
        Self {
            author_id: "user:anonymous".to_string(),
            author_role: "developer".to_string(),
            pg_connection_string: None,
            watched_tables: Vec::new(),
        }
    }
}

/// Load `config.json` from `repo_dir`, returning the anonymous default if
/// it doesn't exist yet.
///
/// # Errors
/// Returns [`ScribeError::JsonParse`] if the file exists but is malformed.
pub fn load_or_default(repo_dir: &Path) -> Result<RepoConfig> {
    let service = ConfigService::new(FileConfigStore::new(repo_dir.join("config.json")));
    Ok(service.load()?.unwrap_or_else(RepoConfig::anonymous_default))
}

/// Persist `config` to `config.json` under `repo_dir`.
///
/// # Errors
/// Returns [`ScribeError::Io`] on write failure.
pub fn save(repo_dir: &Path, config: &RepoConfig) -> Result<()> {
    let service = ConfigService::new(FileConfigStore::new(repo_dir.join("config.json")));
    service.save(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_loads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_or_default(dir.path()).unwrap();
        assert_eq!(config, RepoConfig::anonymous_default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RepoConfig::anonymous_default();
        config.watched_tables.push("users".to_string());
        save(dir.path(), &config).unwrap();
        let loaded = load_or_default(dir.path()).unwrap();
        assert_eq!(loaded, config);
    }
}
