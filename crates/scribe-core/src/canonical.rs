// SPDX-License-Identifier: Apache-2.0
//! The `scribe-canon-v1` canonicalisation profile.
//!
//! The reference implementation hashes a pretty-printed JSON pre-image,
//! which is fragile across formatters — the exact insignificant whitespace
//! becomes load-bearing. This profile instead emits a compact form with a
//! fixed field order and no insignificant whitespace at all, so the only
//! thing two conformant implementations must agree on is field order and
//! omission rules, not a pretty-printer's exact behaviour. This is a
//! deliberate, versioned break from the reference pre-image; see
//! `DESIGN.md`.
//!
//! Field order: `commit_id, parent_id, tree_hash, author, process,
//! timestamp, message, changes`. Any field whose value is the zero-hash,
//! null, or empty is omitted, never emitted as `null`.

use crate::error::{Result, ScribeError};
use crate::model::{Author, Change, Envelope, Operation, Process};
use scribe_hash::Hash;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Default)]
struct WireAuthor {
    id: String,
    #[serde(default)]
    role: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    email: Option<String>,
}

#[derive(Serialize, Deserialize, Default)]
struct WireProcess {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    params: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    source: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireChange {
    table: String,
    operation: Operation,
    #[serde(rename = "pk")]
    primary_key: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    before_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    after_hash: Option<String>,
}

#[derive(Serialize, Deserialize, Default)]
struct WireEnvelope {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    commit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    tree_hash: Option<String>,
    #[serde(default)]
    author: WireAuthor,
    #[serde(default)]
    process: WireProcess,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    changes: Vec<WireChange>,
}

fn hash_field(h: Hash) -> Option<String> {
    if h.is_zero() {
        None
    } else {
        Some(h.to_hex())
    }
}

fn parse_hash_field(s: Option<String>) -> Result<Hash> {
    match s {
        None => Ok(Hash::ZERO),
        Some(s) => Ok(Hash::from_hex(&s)?),
    }
}

impl From<&Envelope> for WireEnvelope {
    fn from(env: &Envelope) -> Self {
        Self {
            commit_id: hash_field(env.commit_id),
            parent_id: hash_field(env.parent_id),
            tree_hash: hash_field(env.tree_hash),
            author: WireAuthor {
                id: env.author.id.clone(),
                role: env.author.role.clone(),
                email: env.author.email.clone(),
            },
            process: WireProcess {
                name: env.process.name.clone(),
                version: env.process.version.clone(),
                params: env.process.params.clone(),
                source: env.process.source.clone(),
            },
            timestamp: env.timestamp,
            message: env.message.clone(),
            changes: env
                .changes
                .iter()
                .map(|c| WireChange {
                    table: c.table.clone(),
                    operation: c.operation,
                    primary_key: c.primary_key.clone(),
                    before_hash: hash_field(c.before_hash),
                    after_hash: hash_field(c.after_hash),
                })
                .collect(),
        }
    }
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = ScribeError;

    fn try_from(w: WireEnvelope) -> Result<Self> {
        let mut changes = Vec::with_capacity(w.changes.len());
        for c in w.changes {
            changes.push(Change::new(
                c.table,
                c.operation,
                c.primary_key,
                parse_hash_field(c.before_hash)?,
                parse_hash_field(c.after_hash)?,
            ));
        }
        Ok(Self {
            commit_id: parse_hash_field(w.commit_id)?,
            parent_id: parse_hash_field(w.parent_id)?,
            tree_hash: parse_hash_field(w.tree_hash)?,
            author: Author {
                id: w.author.id,
                role: w.author.role,
                email: w.author.email,
            },
            process: Process {
                name: w.process.name,
                version: w.process.version,
                params: w.process.params,
                source: w.process.source,
            },
            timestamp: w.timestamp,
            message: w.message,
            changes,
        })
    }
}

/// Serialise `env` into the `scribe-canon-v1` compact text form.
#[must_use]
pub fn to_canonical(env: &Envelope) -> String {
    let wire = WireEnvelope::from(env);
    // Construction above only ever produces valid UTF-8 scalar fields;
    // serialisation of this fixed shape cannot fail.
    #[allow(clippy::unwrap_used)]
    serde_json::to_string(&wire).unwrap()
}

/// Parse the `scribe-canon-v1` compact text form back into an [`Envelope`].
///
/// # Errors
/// Returns [`ScribeError::JsonParse`] on malformed JSON, or
/// [`ScribeError::JsonSchema`] if a hash field is present but not valid hex.
pub fn from_canonical(text: &str) -> Result<Envelope> {
    let wire: WireEnvelope = serde_json::from_str(text)?;
    Envelope::try_from(wire)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Author, Process};

    #[test]
    fn round_trip_preserves_content() {
        let mut env = Envelope::new(Author::new("user:alice", "developer"), Process::new("scribe-cli"));
        env.set_message("hello");
        env.add_change(
            "users",
            Operation::Insert,
            r#"{"id":1}"#,
            Hash::ZERO,
            scribe_hash::hash(b"row"),
        );
        env.finalize();

        let text = to_canonical(&env);
        let parsed = from_canonical(&text).unwrap();
        assert_eq!(parsed, env);
    }

    #[test]
    fn zero_hash_fields_are_omitted_not_null() {
        let env = Envelope::new(Author::new("user:alice", "developer"), Process::new("scribe-cli"));
        let text = to_canonical(&env);
        assert!(!text.contains("\"parent_id\""));
        assert!(!text.contains("\"tree_hash\""));
        assert!(!text.contains("\"commit_id\""));
        assert!(!text.contains("null"));
    }

    #[test]
    fn empty_changes_are_omitted() {
        let env = Envelope::new(Author::new("user:alice", "developer"), Process::new("scribe-cli"));
        let text = to_canonical(&env);
        assert!(!text.contains("\"changes\""));
    }

    #[test]
    fn field_order_is_fixed() {
        let mut env = Envelope::new(Author::new("user:alice", "developer"), Process::new("scribe-cli"));
        env.finalize();
        env.set_message("m");
        let text = to_canonical(&env);
        let commit_id_pos = text.find("\"commit_id\"").unwrap();
        let author_pos = text.find("\"author\"").unwrap();
        let process_pos = text.find("\"process\"").unwrap();
        let timestamp_pos = text.find("\"timestamp\"").unwrap();
        let message_pos = text.find("\"message\"").unwrap();
        assert!(commit_id_pos < author_pos);
        assert!(author_pos < process_pos);
        assert!(process_pos < timestamp_pos);
        assert!(timestamp_pos < message_pos);
    }

    #[test]
    fn no_insignificant_whitespace() {
        let mut env = Envelope::new(Author::new("user:alice", "developer"), Process::new("scribe-cli"));
        env.finalize();
        let text = to_canonical(&env);
        assert!(!text.contains('\n'));
        assert!(!text.contains("  "));
    }
}
