// SPDX-License-Identifier: Apache-2.0
//! Uniform error taxonomy for the lineage engine.
//!
//! Every fallible operation in this crate returns [`ScribeError`]. The core
//! never prints an error itself; each variant carries its own detail
//! message so a caller (the CLI, the ingestion loop) can format it without
//! reaching back into thread-local state.

use thiserror::Error;

/// The uniform error type returned by `scribe-core` and `scribe-cdc`.
#[derive(Debug, Error)]
pub enum ScribeError {
    /// An argument was invalid (null, empty where required, malformed).
    #[error("invalid argument: {0}")]
    InvalidArg(String),
    /// A requested resource (commit, ref, config key) was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Allocation or capacity failure.
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    /// The current directory (or given path) is not a Scribe repository.
    #[error("not a repository: {0}")]
    NotARepo(String),
    /// A repository already exists at the target path.
    #[error("repository already exists: {0}")]
    RepoExists(String),
    /// The repository's on-disk state is inconsistent with its invariants.
    #[error("repository corrupt: {0}")]
    RepoCorrupt(String),
    /// A filesystem I/O operation failed.
    #[error("I/O error: {0}")]
    Io(String),
    /// The embedded commit store reported an error.
    #[error("database error: {0}")]
    Db(String),
    /// A referenced commit or blob is absent from its store.
    #[error("object missing: {0}")]
    ObjectMissing(String),
    /// A stored value's id did not match its recomputed digest.
    #[error("hash mismatch: {0}")]
    HashMismatch(String),
    /// A cryptographic primitive failed or was misused.
    #[error("crypto error: {0}")]
    Crypto(String),
    /// A commit with the same id was already present in the store.
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// Failed to connect to the upstream PostgreSQL database.
    #[error("postgres connection error: {0}")]
    PgConnect(String),
    /// A query against the upstream PostgreSQL database failed.
    #[error("postgres query error: {0}")]
    PgQuery(String),
    /// A logical-replication operation against upstream failed.
    #[error("postgres replication error: {0}")]
    PgReplication(String),
    /// Envelope or config JSON failed to parse.
    #[error("JSON parse error: {0}")]
    JsonParse(String),
    /// Parsed JSON did not satisfy the expected schema.
    #[error("JSON schema error: {0}")]
    JsonSchema(String),
}

impl ScribeError {
    /// Re-tag an [`ObjectMissing`](Self::ObjectMissing) or load failure as
    /// [`RepoCorrupt`](Self::RepoCorrupt), per the policy that a missing
    /// object reached via a parent link indicates a corrupt repository
    /// rather than a simple not-found.
    #[must_use]
    pub fn into_repo_corrupt(self) -> Self {
        match self {
            Self::ObjectMissing(d) | Self::JsonParse(d) | Self::JsonSchema(d) => {
                Self::RepoCorrupt(d)
            }
            other => other,
        }
    }
}

impl From<std::io::Error> for ScribeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ScribeError {
    fn from(e: serde_json::Error) -> Self {
        Self::JsonParse(e.to_string())
    }
}

impl From<sqlx::Error> for ScribeError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return Self::AlreadyExists(db_err.to_string());
            }
        }
        Self::Db(e.to_string())
    }
}

impl From<scribe_hash::HashParseError> for ScribeError {
    fn from(e: scribe_hash::HashParseError) -> Self {
        Self::JsonSchema(e.to_string())
    }
}

impl From<scribe_merkle::MerkleError> for ScribeError {
    fn from(e: scribe_merkle::MerkleError) -> Self {
        Self::Crypto(e.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ScribeError>;
