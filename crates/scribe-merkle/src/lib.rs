// SPDX-License-Identifier: Apache-2.0
//! Merkle tree construction and inclusion proofs.
//!
//! Leaves are accumulated in insertion order, then folded bottom-up: pairs
//! of adjacent nodes combine via [`scribe_hash::hash_node`]; an odd node at
//! the end of a level pairs with itself. This self-pairing rule must be
//! reproduced bit-exactly by any compatible implementation — it is the
//! usual source of incompatibility between Merkle tree implementations.
//!
//! Internal nodes are never materialised as a pointer graph. The tree keeps
//! only the ordered leaf vector and the per-level hash vectors produced by
//! [`MerkleTree::build`]; proofs are derived from those vectors on demand.
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

use scribe_hash::{hash_leaf, hash_node, Hash};
use thiserror::Error;

/// Errors produced by [`MerkleTree`] and [`MerkleProof`] operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerkleError {
    /// A leaf was added after [`MerkleTree::build`] was called.
    #[error("cannot add leaves after the tree has been built")]
    AlreadyBuilt,
    /// An operation that requires a built tree was called before `build()`.
    #[error("tree has not been built")]
    NotBuilt,
    /// A leaf index was out of range for the current leaf count.
    #[error("leaf index {index} out of bounds for {len} leaves")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The number of leaves present.
        len: usize,
    },
    /// [`MerkleTree::verify`] found the cached root did not match a fresh
    /// fold over the leaves.
    #[error("merkle root does not match recomputed fold")]
    RootMismatch,
}

/// A single accumulated leaf: a field name plus its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Leaf {
    #[allow(dead_code)]
    field_name: String,
    hash: Hash,
}

/// Which side of a `hash_node` pairing a sibling occupied.
///
/// `Side::Right` means the proof subject was the left operand and the
/// sibling was the right; `Side::Left` is the converse. Replaying a proof
/// means folding with `hash_node` using this order at every level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Side {
    /// The sibling was the left operand of `hash_node`.
    Left,
    /// The sibling was the right operand of `hash_node`.
    Right,
}

/// One step of a Merkle inclusion proof: a sibling digest and its side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProofStep {
    /// The sibling hash at this level.
    pub sibling: Hash,
    /// Which side the sibling occupies relative to the node being proven.
    pub side: Side,
}

/// An inclusion proof: an ordered sequence of [`ProofStep`]s from leaf to
/// root.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MerkleProof {
    steps: Vec<ProofStep>,
}

impl MerkleProof {
    /// The proof steps, leaf to root.
    #[must_use]
    pub fn steps(&self) -> &[ProofStep] {
        &self.steps
    }

    /// Replay this proof starting from `leaf_hash` and return the resulting
    /// root digest.
    #[must_use]
    pub fn fold(&self, leaf_hash: Hash) -> Hash {
        self.steps.iter().fold(leaf_hash, |acc, step| match step.side {
            Side::Right => hash_node(acc, step.sibling),
            Side::Left => hash_node(step.sibling, acc),
        })
    }

    /// Verify that replaying this proof from `leaf_hash` yields `root`.
    #[must_use]
    pub fn verify(&self, leaf_hash: Hash, root: Hash) -> bool {
        self.fold(leaf_hash) == root
    }
}

/// A two-phase Merkle tree builder: accumulate leaves, then fold.
#[derive(Debug, Default)]
pub struct MerkleTree {
    leaves: Vec<Leaf>,
    levels: Option<Vec<Vec<Hash>>>,
}

impl MerkleTree {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a leaf computed as `hash_leaf(data)`.
    ///
    /// # Errors
    /// Returns [`MerkleError::AlreadyBuilt`] if called after [`Self::build`].
    pub fn add_field(&mut self, field_name: impl Into<String>, data: &[u8]) -> Result<(), MerkleError> {
        self.add_leaf(field_name, hash_leaf(data))
    }

    /// Append a leaf using a pre-computed digest verbatim (no re-hashing).
    ///
    /// # Errors
    /// Returns [`MerkleError::AlreadyBuilt`] if called after [`Self::build`].
    pub fn add_hash(&mut self, field_name: impl Into<String>, hash: Hash) -> Result<(), MerkleError> {
        self.add_leaf(field_name, hash)
    }

    fn add_leaf(&mut self, field_name: impl Into<String>, hash: Hash) -> Result<(), MerkleError> {
        if self.levels.is_some() {
            return Err(MerkleError::AlreadyBuilt);
        }
        self.leaves.push(Leaf {
            field_name: field_name.into(),
            hash,
        });
        Ok(())
    }

    /// Fold the accumulated leaves into a root digest, caching every level.
    ///
    /// Idempotent: calling `build()` again after it already succeeded is a
    /// no-op (the cached levels are kept, not recomputed).
    pub fn build(&mut self) {
        if self.levels.is_some() {
            return;
        }
        self.levels = Some(Self::fold_levels(&self.leaves));
    }

    fn fold_levels(leaves: &[Leaf]) -> Vec<Vec<Hash>> {
        if leaves.is_empty() {
            return vec![vec![Hash::ZERO]];
        }
        let mut levels = Vec::new();
        let mut current: Vec<Hash> = leaves.iter().map(|l| l.hash).collect();
        levels.push(current.clone());
        while current.len() > 1 {
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            let mut i = 0;
            while i < current.len() {
                let left = current[i];
                let right = if i + 1 < current.len() { current[i + 1] } else { left };
                next.push(hash_node(left, right));
                i += 2;
            }
            levels.push(next.clone());
            current = next;
        }
        levels
    }

    /// The root digest. Zero-hash if no leaves were accumulated.
    ///
    /// # Errors
    /// Returns [`MerkleError::NotBuilt`] if [`Self::build`] has not run.
    pub fn root(&self) -> Result<Hash, MerkleError> {
        let levels = self.levels.as_ref().ok_or(MerkleError::NotBuilt)?;
        // The last level always has exactly one entry (or is the
        // single-entry empty-tree sentinel level).
        levels
            .last()
            .and_then(|level| level.first().copied())
            .ok_or(MerkleError::NotBuilt)
    }

    /// Number of leaves accumulated so far.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Recompute the fold fresh from the leaf vector and confirm it matches
    /// the cached root.
    ///
    /// # Errors
    /// Returns [`MerkleError::NotBuilt`] if the tree has not been built, or
    /// [`MerkleError::RootMismatch`] if recomputation diverges from the
    /// cached value (this should never happen absent memory corruption).
    pub fn verify(&self) -> Result<(), MerkleError> {
        let cached = self.root()?;
        let fresh = Self::fold_levels(&self.leaves);
        let recomputed = fresh
            .last()
            .and_then(|level| level.first().copied())
            .ok_or(MerkleError::NotBuilt)?;
        if cached == recomputed {
            Ok(())
        } else {
            Err(MerkleError::RootMismatch)
        }
    }

    /// Build an inclusion proof for the leaf at `leaf_index`.
    ///
    /// # Errors
    /// Returns [`MerkleError::NotBuilt`] if not yet built, or
    /// [`MerkleError::IndexOutOfBounds`] if `leaf_index >= leaf_count()`.
    pub fn proof(&self, leaf_index: usize) -> Result<MerkleProof, MerkleError> {
        let levels = self.levels.as_ref().ok_or(MerkleError::NotBuilt)?;
        if leaf_index >= self.leaves.len() {
            return Err(MerkleError::IndexOutOfBounds {
                index: leaf_index,
                len: self.leaves.len(),
            });
        }
        let mut steps = Vec::new();
        let mut idx = leaf_index;
        for level in &levels[..levels.len().saturating_sub(1)] {
            let is_left = idx % 2 == 0;
            let sibling_idx = if is_left {
                if idx + 1 < level.len() {
                    idx + 1
                } else {
                    idx
                }
            } else {
                idx - 1
            };
            let sibling = level[sibling_idx];
            let side = if is_left { Side::Right } else { Side::Left };
            steps.push(ProofStep { sibling, side });
            idx /= 2;
        }
        Ok(MerkleProof { steps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tree_root_is_zero() {
        let mut t = MerkleTree::new();
        t.build();
        assert_eq!(t.root().unwrap(), Hash::ZERO);
    }

    #[test]
    fn single_leaf_root_is_its_own_digest() {
        let mut t = MerkleTree::new();
        t.add_field("a", b"a").unwrap();
        t.build();
        assert_eq!(t.root().unwrap(), hash_leaf(b"a"));
    }

    #[test]
    fn odd_leaf_count_self_pairs() {
        let mut t = MerkleTree::new();
        t.add_field("a", b"a").unwrap();
        t.add_field("b", b"b").unwrap();
        t.add_field("c", b"c").unwrap();
        t.build();
        let a = hash_leaf(b"a");
        let b = hash_leaf(b"b");
        let c = hash_leaf(b"c");
        let expected = hash_node(hash_node(a, b), hash_node(c, c));
        assert_eq!(t.root().unwrap(), expected);
    }

    #[test]
    fn add_hash_uses_digest_verbatim() {
        let mut t = MerkleTree::new();
        let precomputed = scribe_hash::hash(b"already-a-leaf-digest");
        t.add_hash("x", precomputed).unwrap();
        t.build();
        assert_eq!(t.root().unwrap(), precomputed);
    }

    #[test]
    fn cannot_add_after_build() {
        let mut t = MerkleTree::new();
        t.add_field("a", b"a").unwrap();
        t.build();
        assert_eq!(t.add_field("b", b"b"), Err(MerkleError::AlreadyBuilt));
    }

    #[test]
    fn root_before_build_is_not_built_error() {
        let t = MerkleTree::new();
        assert_eq!(t.root(), Err(MerkleError::NotBuilt));
    }

    #[test]
    fn proof_out_of_bounds() {
        let mut t = MerkleTree::new();
        t.add_field("a", b"a").unwrap();
        t.build();
        assert_eq!(
            t.proof(5),
            Err(MerkleError::IndexOutOfBounds { index: 5, len: 1 })
        );
    }

    #[test]
    fn proof_verifies_for_every_leaf_in_odd_tree() {
        let mut t = MerkleTree::new();
        for f in ["a", "b", "c"] {
            t.add_field(f, f.as_bytes()).unwrap();
        }
        t.build();
        let root = t.root().unwrap();
        for (i, f) in ["a", "b", "c"].iter().enumerate() {
            let proof = t.proof(i).unwrap();
            let leaf = hash_leaf(f.as_bytes());
            assert!(proof.verify(leaf, root), "leaf {i} failed to verify");
        }
    }

    #[test]
    fn proof_rejects_wrong_leaf() {
        let mut t = MerkleTree::new();
        for f in ["a", "b", "c", "d"] {
            t.add_field(f, f.as_bytes()).unwrap();
        }
        t.build();
        let root = t.root().unwrap();
        let proof = t.proof(0).unwrap();
        assert!(!proof.verify(hash_leaf(b"not-a"), root));
    }

    #[test]
    fn single_leaf_proof_is_empty() {
        let mut t = MerkleTree::new();
        t.add_field("a", b"a").unwrap();
        t.build();
        let proof = t.proof(0).unwrap();
        assert!(proof.steps().is_empty());
        assert_eq!(proof.fold(hash_leaf(b"a")), t.root().unwrap());
    }

    #[test]
    fn verify_passes_on_untampered_tree() {
        let mut t = MerkleTree::new();
        t.add_field("a", b"a").unwrap();
        t.add_field("b", b"b").unwrap();
        t.build();
        assert!(t.verify().is_ok());
    }

    proptest::proptest! {
        #[test]
        fn proof_always_verifies_for_any_leaf_set(leaves in proptest::collection::vec(proptest::collection::vec(proptest::prelude::any::<u8>(), 0..16), 1..32)) {
            let mut t = MerkleTree::new();
            for (i, data) in leaves.iter().enumerate() {
                t.add_field(format!("f{i}"), data).unwrap();
            }
            t.build();
            let root = t.root().unwrap();
            for (i, data) in leaves.iter().enumerate() {
                let proof = t.proof(i).unwrap();
                proptest::prop_assert!(proof.verify(hash_leaf(data), root));
            }
        }
    }
}
