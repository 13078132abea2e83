// SPDX-License-Identifier: Apache-2.0
//! SHA-256 digest primitives for Scribe.
//!
//! Three deterministic, streaming-capable operations: [`hash`] over raw
//! bytes, [`hash_leaf`] and [`hash_node`] with domain-separating prefixes
//! for Merkle tree construction. The `0x00`/`0x01` prefixes are required —
//! they make leaf and internal digests non-interchangeable, closing
//! second-preimage attacks against Merkle trees of variable depth.
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

use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of bytes in a [`Hash`].
pub const HASH_SIZE: usize = 32;

/// Number of hex characters in a [`Hash`]'s canonical text form.
pub const HASH_HEX_LEN: usize = HASH_SIZE * 2;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// A fixed 32-byte SHA-256 digest.
///
/// The all-zero value is the sentinel "absent" hash (no parent, no
/// before/after side on insert/delete). Equality is byte-wise. The
/// canonical text form is 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(into = "String", try_from = "String"))]
pub struct Hash([u8; HASH_SIZE]);

/// Errors produced while parsing a [`Hash`] from hex.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashParseError {
    /// The input was not exactly [`HASH_HEX_LEN`] characters long.
    #[error("expected {HASH_HEX_LEN} hex characters, got {0}")]
    WrongLength(usize),
    /// The input contained a non-hex-digit character.
    #[error("invalid hex digit at byte offset {0}")]
    InvalidDigit(usize),
}

impl Hash {
    /// The sentinel hash denoting "absent" (zero-filled).
    pub const ZERO: Self = Self([0u8; HASH_SIZE]);

    /// Wrap a raw 32-byte digest.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// View the digest as a byte slice.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Returns `true` if this is the zero (sentinel "absent") hash.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Lowercase hex encoding, exactly [`HASH_HEX_LEN`] characters.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex string into a `Hash`. Accepts either case; fails on any
    /// non-hex character or wrong length.
    pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
        if s.len() != HASH_HEX_LEN {
            return Err(HashParseError::WrongLength(s.len()));
        }
        let mut out = [0u8; HASH_SIZE];
        hex::decode_to_slice(s, &mut out).map_err(|_| {
            let offset = s
                .bytes()
                .position(|b| !b.is_ascii_hexdigit())
                .unwrap_or(0);
            HashParseError::InvalidDigit(offset)
        })?;
        Ok(Self(out))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Hash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<Hash> for String {
    fn from(h: Hash) -> Self {
        h.to_hex()
    }
}

impl TryFrom<String> for Hash {
    type Error = HashParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

/// `SHA256(bytes)` — no framing, exactly the input bytes.
pub fn hash(bytes: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Hash(hasher.finalize().into())
}

/// `SHA256(0x00 ‖ bytes)` — the Merkle leaf digest.
pub fn hash_leaf(bytes: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(bytes);
    Hash(hasher.finalize().into())
}

/// `SHA256(0x01 ‖ left ‖ right)` — the Merkle internal-node digest.
pub fn hash_node(left: Hash, right: Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Hash(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hash_round_trips_through_hex() {
        assert_eq!(Hash::ZERO.to_hex(), "0".repeat(HASH_HEX_LEN));
        assert_eq!(Hash::from_hex(&"0".repeat(HASH_HEX_LEN)).unwrap(), Hash::ZERO);
    }

    #[test]
    fn hex_round_trip() {
        let h = hash(b"hello");
        let hex = h.to_hex();
        assert_eq!(hex.len(), HASH_HEX_LEN);
        assert_eq!(Hash::from_hex(&hex).unwrap(), h);
    }

    #[test]
    fn hex_decode_accepts_uppercase() {
        let h = hash(b"hello");
        let upper = h.to_hex().to_uppercase();
        assert_eq!(Hash::from_hex(&upper).unwrap(), h);
    }

    #[test]
    fn hex_decode_rejects_wrong_length() {
        assert_eq!(Hash::from_hex("abcd"), Err(HashParseError::WrongLength(4)));
    }

    #[test]
    fn hex_decode_rejects_non_hex() {
        let bad = "g".repeat(HASH_HEX_LEN);
        assert!(matches!(
            Hash::from_hex(&bad),
            Err(HashParseError::InvalidDigit(_))
        ));
    }

    #[test]
    fn leaf_and_node_are_domain_separated() {
        // hash_leaf(x) must differ from hash_node(x, x) even over identical
        // argument bytes.
        let x = b"same-bytes";
        let leaf = hash_leaf(x);
        let as_hash = hash(x);
        let node = hash_node(as_hash, as_hash);
        assert_ne!(leaf, node);
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash(b"abc"), hash(b"abc"));
        assert_ne!(hash(b"abc"), hash(b"abd"));
    }

    #[test]
    fn empty_input_is_stable_sha256() {
        // SHA-256("") is a well-known constant.
        assert_eq!(
            hash(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"[..64]
        );
    }

    proptest::proptest! {
        #[test]
        fn hex_round_trip_is_total(bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..256)) {
            let h = hash(&bytes);
            proptest::prop_assert_eq!(Hash::from_hex(&h.to_hex()).unwrap(), h);
        }

        #[test]
        fn single_byte_flip_changes_hash(a in proptest::prelude::any::<[u8; 32]>(), idx in 0usize..32, flip in 1u8..=255) {
            let mut b = a;
            b[idx] ^= flip;
            proptest::prop_assert_ne!(hash(&a), hash(&b));
        }
    }
}
