// SPDX-License-Identifier: Apache-2.0
//! The envelope data model: [`Author`], [`Process`], [`Operation`],
//! [`Change`] and [`Envelope`] itself.

use crate::error::{Result, ScribeError};
use scribe_hash::Hash;
use serde::{Deserialize, Serialize};

/// Author identity attached to a commit. `id` follows the convention
/// `"<kind>:<name>"`, e.g. `user:alice` or `service:etl`. Unlike `email`,
/// `role` is mandatory — every commit must attribute a free-form role
/// (`"developer"`, `"automated"`, ...) to its author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// The author id, e.g. `"service:etl"`.
    pub id: String,
    /// A free-form role string, e.g. `"developer"` or `"automated"`.
    pub role: String,
    /// An optional contact email.
    pub email: Option<String>,
}

impl Author {
    /// Construct an author with no email set.
    #[must_use]
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            email: None,
        }
    }
}

/// The process that produced a commit (a CLI invocation, a CDC worker, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    /// Process name, e.g. `"scribe-cli"` or `"scribe-cdc"`.
    pub name: String,
    /// Process version string.
    pub version: Option<String>,
    /// Free-form parameters (not schema-validated).
    pub params: Option<String>,
    /// The upstream source this process consumed, if any (e.g. a
    /// connection string's host, or a file path).
    pub source: Option<String>,
}

impl Process {
    /// Construct a process with only a name set.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// The kind of row-level mutation a [`Change`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// A new row was inserted.
    Insert,
    /// An existing row was modified.
    Update,
    /// A row was removed.
    Delete,
}

impl Operation {
    /// The canonical uppercase string form (`INSERT`/`UPDATE`/`DELETE`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl std::str::FromStr for Operation {
    type Err = ScribeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(ScribeError::InvalidArg(format!("unknown operation {other:?}"))),
        }
    }
}

/// One row-level mutation within a commit, preserving insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// The table the mutation applies to.
    pub table: String,
    /// The kind of mutation.
    pub operation: Operation,
    /// JSON-encoded primary key of the affected row.
    pub primary_key: String,
    /// Digest of the row's prior value. Zero-hash for `INSERT`.
    pub before_hash: Hash,
    /// Digest of the row's new value. Zero-hash for `DELETE`.
    pub after_hash: Hash,
}

impl Change {
    /// Build a change record. Callers are responsible for the
    /// before/after zero-hash convention implied by `operation`; this
    /// constructor does not enforce it (the store's schema does, via the
    /// `operation` CHECK constraint; the semantic pairing is a convention,
    /// not a validated invariant, per the envelope's public contract).
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        operation: Operation,
        primary_key: impl Into<String>,
        before_hash: Hash,
        after_hash: Hash,
    ) -> Self {
        Self {
            table: table.into(),
            operation,
            primary_key: primary_key.into(),
            before_hash,
            after_hash,
        }
    }
}

/// The immutable, content-addressed unit of history.
///
/// Construct with [`Envelope::new`], mutate with the setters and
/// [`Envelope::add_change`], then call [`Envelope::finalize`] exactly once
/// before storing. Setters never perform I/O and fail only on invalid
/// input shape (there is none to reject in the Rust API beyond what the
/// type system already prevents, so they are infallible here).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// The envelope's own content-addressed id. Zero until [`Self::finalize`].
    pub commit_id: Hash,
    /// The predecessor commit id, or zero for the root commit.
    pub parent_id: Hash,
    /// Merkle root over this commit's change digests.
    pub tree_hash: Hash,
    /// The author of this commit.
    pub author: Author,
    /// The process that produced this commit.
    pub process: Process,
    /// Unix seconds at construction time.
    pub timestamp: i64,
    /// An optional free-form commit message.
    pub message: Option<String>,
    /// The ordered set of row-level changes.
    pub changes: Vec<Change>,
}

impl Envelope {
    /// A fresh envelope: zeroed hashes, `timestamp = now`, no changes.
    #[must_use]
    pub fn new(author: Author, process: Process) -> Self {
        Self {
            commit_id: Hash::ZERO,
            parent_id: Hash::ZERO,
            tree_hash: Hash::ZERO,
            author,
            process,
            timestamp: now_unix(),
            message: None,
            changes: Vec::new(),
        }
    }

    /// Set the parent commit id. Pass [`Hash::ZERO`] to mark a root commit.
    pub fn set_parent(&mut self, parent: Hash) {
        self.parent_id = parent;
    }

    /// Set the commit message.
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    /// Explicitly set `tree_hash`, bypassing [`Self::finalize`]'s
    /// derivation from `changes`. Used when a caller has already computed
    /// the Merkle root (e.g. the CDC loop batching several changes under
    /// one externally-supplied root).
    pub fn set_tree_hash(&mut self, tree_hash: Hash) {
        self.tree_hash = tree_hash;
    }

    /// Append a change, preserving insertion order. `operation` is not
    /// semantically validated here — the commit store's schema enforces
    /// the `INSERT`/`UPDATE`/`DELETE` enum on persist.
    pub fn add_change(
        &mut self,
        table: impl Into<String>,
        operation: Operation,
        primary_key: impl Into<String>,
        before_hash: Hash,
        after_hash: Hash,
    ) {
        self.changes
            .push(Change::new(table, operation, primary_key, before_hash, after_hash));
    }

    /// Compute `tree_hash` (if still zero) from the non-zero before/after
    /// digests of every change in order, then compute `commit_id` over the
    /// canonical text of the envelope with `commit_id` treated as absent.
    ///
    /// Idempotent: if `tree_hash` is already non-zero it is kept as-is;
    /// `commit_id` is always recomputed over current content.
    pub fn finalize(&mut self) {
        if self.tree_hash.is_zero() && !self.changes.is_empty() {
            let mut tree = scribe_merkle::MerkleTree::new();
            for change in &self.changes {
                if !change.before_hash.is_zero() {
                    #[allow(clippy::unwrap_used)]
                    tree.add_hash("before", change.before_hash).unwrap();
                }
                if !change.after_hash.is_zero() {
                    #[allow(clippy::unwrap_used)]
                    tree.add_hash("after", change.after_hash).unwrap();
                }
            }
            tree.build();
            #[allow(clippy::unwrap_used)]
            {
                self.tree_hash = tree.root().unwrap();
            }
        }

        self.commit_id = Hash::ZERO;
        let canonical = crate::canonical::to_canonical(self);
        self.commit_id = scribe_hash::hash(canonical.as_bytes());
    }

    /// Recompute `commit_id` the same way [`Self::finalize`] does and
    /// compare it against the stored value.
    ///
    /// # Errors
    /// Returns [`ScribeError::HashMismatch`] if the envelope was tampered
    /// with or canonicalisation drifted between producer and verifier.
    pub fn verify(&self) -> Result<()> {
        let mut copy = self.clone();
        copy.commit_id = Hash::ZERO;
        let canonical = crate::canonical::to_canonical(&copy);
        let recomputed = scribe_hash::hash(canonical.as_bytes());
        if recomputed == self.commit_id {
            Ok(())
        } else {
            Err(ScribeError::HashMismatch(format!(
                "expected {}, recomputed {recomputed}",
                self.commit_id
            )))
        }
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_is_idempotent_on_tree_hash() {
        let mut env = Envelope::new(Author::new("user:alice", "developer"), Process::new("test"));
        env.add_change(
            "users",
            Operation::Insert,
            r#"{"id":1}"#,
            Hash::ZERO,
            scribe_hash::hash(b"row"),
        );
        env.finalize();
        let tree_hash = env.tree_hash;
        env.finalize();
        assert_eq!(env.tree_hash, tree_hash);
    }

    #[test]
    fn empty_changes_yield_zero_tree_hash_but_nonzero_commit_id() {
        let mut env = Envelope::new(Author::new("user:alice", "developer"), Process::new("test"));
        env.finalize();
        assert!(env.tree_hash.is_zero());
        assert!(!env.commit_id.is_zero());
    }

    #[test]
    fn verify_detects_tampering() {
        let mut env = Envelope::new(Author::new("user:alice", "developer"), Process::new("test"));
        env.finalize();
        assert!(env.verify().is_ok());
        env.message = Some("tampered".to_string());
        assert!(matches!(env.verify(), Err(ScribeError::HashMismatch(_))));
    }

    #[test]
    fn identical_envelopes_finalize_to_the_same_id() {
        let mut a = Envelope::new(Author::new("user:alice", "developer"), Process::new("test"));
        a.timestamp = 1_700_000_000;
        let mut b = a.clone();
        a.add_change("t", Operation::Insert, "{}", Hash::ZERO, scribe_hash::hash(b"x"));
        b.add_change("t", Operation::Insert, "{}", Hash::ZERO, scribe_hash::hash(b"x"));
        a.finalize();
        b.finalize();
        assert_eq!(a.commit_id, b.commit_id);
    }

    #[test]
    fn operation_round_trips_through_str() {
        use std::str::FromStr;
        for op in [Operation::Insert, Operation::Update, Operation::Delete] {
            assert_eq!(Operation::from_str(op.as_str()).unwrap(), op);
        }
    }
}
