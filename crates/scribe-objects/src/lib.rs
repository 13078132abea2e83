// SPDX-License-Identifier: Apache-2.0
//! Filesystem content-addressed blob store for Scribe.
//!
//! `scribe-objects` provides a [`BlobStore`] trait for content-addressed
//! storage keyed by plain `SHA256(bytes)` (no domain prefix — content is
//! the identity; leaf/node domain separation is a Merkle-layer concern,
//! not a storage-layer one). Blobs live at `objects/XX/YYY…`, where `XX`
//! is the first two hex characters of the hash and `YYY…` the remaining
//! 62. Writes are staged at `<path>.tmp.<pid>` and atomically renamed, so
//! a crash mid-write never leaves a partially-written object visible at
//! its final path.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::module_name_repetitions,
    clippy::use_self,
    clippy::multiple_crate_versions
)]

use scribe_hash::Hash;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from [`FsObjectStore`] operations.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// Blob bytes did not match a caller-supplied expected hash.
    #[error("hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch {
        /// The hash the caller asserted.
        expected: Hash,
        /// The hash actually computed from the bytes.
        computed: Hash,
    },
    /// A filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Content-addressed blob store keyed by [`Hash`].
///
/// `get` returning `Ok(None)` is not an error — absence is the normal
/// outcome for a hash that was never written or was garbage collected.
pub trait BlobStore {
    /// Compute the hash of `bytes` and store it, returning the hash.
    ///
    /// # Errors
    /// Returns [`ObjectStoreError::Io`] on a filesystem failure.
    fn put(&self, bytes: &[u8]) -> Result<Hash, ObjectStoreError>;

    /// Store `bytes` under a caller-supplied `expected` hash, verifying it
    /// first.
    ///
    /// # Errors
    /// Returns [`ObjectStoreError::HashMismatch`] if `SHA256(bytes) !=
    /// expected`, or [`ObjectStoreError::Io`] on a filesystem failure.
    fn put_verified(&self, expected: Hash, bytes: &[u8]) -> Result<(), ObjectStoreError>;

    /// Retrieve the blob for `hash`. `None` if not present.
    ///
    /// # Errors
    /// Returns [`ObjectStoreError::Io`] on a filesystem failure other than
    /// not-found.
    fn get(&self, hash: Hash) -> Result<Option<Vec<u8>>, ObjectStoreError>;

    /// Check existence without reading the blob.
    ///
    /// # Errors
    /// Returns [`ObjectStoreError::Io`] on a filesystem failure other than
    /// not-found.
    fn has(&self, hash: Hash) -> Result<bool, ObjectStoreError>;
}

/// A [`BlobStore`] rooted at a directory of `objects/XX/YYY…` files.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Point the store at `root` (typically `<repo>/.scribe/objects`).
    /// The directory is not created until the first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The path a blob for `hash` would live at, whether or not it
    /// currently exists.
    #[must_use]
    pub fn path_for(&self, hash: Hash) -> PathBuf {
        let hex = hash.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), ObjectStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension(format!("tmp.{}", std::process::id()));
        std::fs::write(&tmp_path, bytes)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

impl BlobStore for FsObjectStore {
    fn put(&self, bytes: &[u8]) -> Result<Hash, ObjectStoreError> {
        let hash = scribe_hash::hash(bytes);
        let path = self.path_for(hash);
        if !path.exists() {
            self.write_atomic(&path, bytes)?;
        }
        Ok(hash)
    }

    fn put_verified(&self, expected: Hash, bytes: &[u8]) -> Result<(), ObjectStoreError> {
        let computed = scribe_hash::hash(bytes);
        if computed != expected {
            return Err(ObjectStoreError::HashMismatch { expected, computed });
        }
        let path = self.path_for(expected);
        if !path.exists() {
            self.write_atomic(&path, bytes)?;
        }
        Ok(())
    }

    fn get(&self, hash: Hash) -> Result<Option<Vec<u8>>, ObjectStoreError> {
        match std::fs::read(self.path_for(hash)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn has(&self, hash: Hash) -> Result<bool, ObjectStoreError> {
        Ok(self.path_for(hash).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let hash = store.put(b"hello world").unwrap();
        assert_eq!(store.get(hash).unwrap().unwrap(), b"hello world");
    }

    #[test]
    fn path_layout_splits_first_two_hex_chars() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let hash = scribe_hash::hash(b"x");
        let path = store.path_for(hash);
        let hex = hash.to_hex();
        assert_eq!(path, dir.path().join(&hex[..2]).join(&hex[2..]));
    }

    #[test]
    fn missing_blob_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let hash = scribe_hash::hash(b"never stored");
        assert!(store.get(hash).unwrap().is_none());
        assert!(!store.has(hash).unwrap());
    }

    #[test]
    fn put_verified_rejects_mismatched_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let wrong = scribe_hash::hash(b"not these bytes");
        let err = store.put_verified(wrong, b"hello").unwrap_err();
        assert!(matches!(err, ObjectStoreError::HashMismatch { .. }));
        assert!(!store.has(wrong).unwrap());
    }

    #[test]
    fn put_is_idempotent_for_same_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let h1 = store.put(b"same").unwrap();
        let h2 = store.put(b"same").unwrap();
        assert_eq!(h1, h2);
    }
}
