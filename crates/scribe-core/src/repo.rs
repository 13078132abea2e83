// SPDX-License-Identifier: Apache-2.0
//! On-disk repository layout: the `.scribe` directory, its database,
//! objects sink path and `config.json`.

use crate::config::{self, RepoConfig};
use crate::error::{Result, ScribeError};
use crate::store::CommitStore;
use std::path::{Path, PathBuf};

const SCRIBE_DIR_NAME: &str = ".scribe";
const DB_FILE_NAME: &str = "scribe.db";
const OBJECTS_DIR_NAME: &str = "objects";

/// An open Scribe repository: its directory, commit store and config.
pub struct Repository {
    root: PathBuf,
    store: CommitStore,
    config: RepoConfig,
}

impl Repository {
    /// The `.scribe` directory path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `objects/` content-addressed blob sink directory (created at
    /// `init`, owned by `scribe-objects`).
    #[must_use]
    pub fn objects_path(&self) -> PathBuf {
        self.root.join(OBJECTS_DIR_NAME)
    }

    /// The commit store.
    #[must_use]
    pub const fn store(&self) -> &CommitStore {
        &self.store
    }

    /// The loaded operator configuration.
    #[must_use]
    pub const fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// Persist `config` as the new operator configuration.
    ///
    /// # Errors
    /// Returns [`ScribeError::Io`] on write failure.
    pub fn save_config(&mut self, config: RepoConfig) -> Result<()> {
        config::save(&self.root, &config)?;
        self.config = config;
        Ok(())
    }

    /// Walk upward from `start` looking for a `.scribe` directory.
    #[must_use]
    pub fn find_root(start: &Path) -> Option<PathBuf> {
        let mut current = Some(start);
        while let Some(dir) = current {
            let candidate = dir.join(SCRIBE_DIR_NAME);
            if candidate.is_dir() {
                return Some(candidate);
            }
            current = dir.parent();
        }
        None
    }

    /// Open an existing repository, searching upward from `start` (or the
    /// current directory if `start` is `None`).
    ///
    /// # Errors
    /// Returns [`ScribeError::NotARepo`] if no `.scribe` directory is
    /// found, or [`ScribeError::Db`]/[`ScribeError::Io`] on open failure.
    pub async fn open(start: Option<&Path>) -> Result<Self> {
        let cwd;
        let start = match start {
            Some(p) => p,
            None => {
                cwd = std::env::current_dir()?;
                &cwd
            }
        };
        let root = Self::find_root(start)
            .ok_or_else(|| ScribeError::NotARepo(start.display().to_string()))?;
        let store = CommitStore::open(root.join(DB_FILE_NAME)).await?;
        let config = config::load_or_default(&root)?;
        Ok(Self { root, store, config })
    }

    /// Create a new repository under `base` (or the current directory).
    ///
    /// # Errors
    /// Returns [`ScribeError::RepoExists`] if `base` (or an ancestor) is
    /// already a repository, or a storage error on init failure.
    pub async fn init(base: Option<&Path>, author_id: &str, author_role: &str) -> Result<Self> {
        let cwd;
        let base = match base {
            Some(p) => p,
            None => {
                cwd = std::env::current_dir()?;
                &cwd
            }
        };
        if let Some(existing) = Self::find_root(base) {
            return Err(ScribeError::RepoExists(existing.display().to_string()));
        }

        let root = base.join(SCRIBE_DIR_NAME);
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(root.join(OBJECTS_DIR_NAME))?;

        let store = CommitStore::open(root.join(DB_FILE_NAME)).await?;
        let config = RepoConfig {
            author_id: author_id.to_string(),
            author_role: author_role.to_string(),
            ..RepoConfig::anonymous_default()
        };
        config::save(&root, &config)?;

        Ok(Self { root, store, config })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_then_open_round_trips_config() {
        let dir = tempfile::tempdir().unwrap();
        {
            let repo = Repository::init(Some(dir.path()), "user:alice", "developer")
                .await
                .unwrap();
            assert_eq!(repo.config().author_id, "user:alice");
            assert!(repo.objects_path().is_dir());
        }
        let repo = Repository::open(Some(dir.path())).await.unwrap();
        assert_eq!(repo.config().author_id, "user:alice");
    }

    #[tokio::test]
    async fn init_twice_fails_with_repo_exists() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(Some(dir.path()), "user:alice", "developer")
            .await
            .unwrap();
        let err = Repository::init(Some(dir.path()), "user:bob", "developer")
            .await
            .unwrap_err();
        assert!(matches!(err, ScribeError::RepoExists(_)));
    }

    #[tokio::test]
    async fn open_outside_any_repo_fails_with_not_a_repo() {
        let dir = tempfile::tempdir().unwrap();
        let err = Repository::open(Some(dir.path())).await.unwrap_err();
        assert!(matches!(err, ScribeError::NotARepo(_)));
    }

    #[tokio::test]
    async fn open_finds_root_from_nested_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(Some(dir.path()), "user:alice", "developer")
            .await
            .unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        let repo = Repository::open(Some(&nested)).await.unwrap();
        assert_eq!(repo.root(), dir.path().join(".scribe"));
    }
}
