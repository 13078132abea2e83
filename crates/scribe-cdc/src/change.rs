// SPDX-License-Identifier: Apache-2.0
//! The mode-agnostic shape a captured row mutation is reduced to before it
//! becomes a [`scribe_core::Change`].

use scribe_core::{Change, Operation};
use scribe_hash::Hash;
use sqlx::PgPool;

/// One row mutation as read off the wire, before hashing.
///
/// `old_data`/`new_data` are the row's JSON-encoded prior/new values
/// (whichever the source can supply); `primary_key` is always JSON-encoded
/// key/value pairs identifying the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    /// The table the mutation applies to.
    pub table: String,
    /// The kind of mutation.
    pub operation: Operation,
    /// JSON-encoded primary key of the affected row.
    pub primary_key: String,
    /// JSON-encoded prior row value. Absent for `INSERT`.
    pub old_data: Option<String>,
    /// JSON-encoded new row value. Absent for `DELETE`.
    pub new_data: Option<String>,
}

impl RawChange {
    /// Hash `old_data`/`new_data` (zero-hash when absent) and build a
    /// [`Change`] ready for [`scribe_core::Envelope::add_change`]-style
    /// construction.
    #[must_use]
    pub fn into_change(self) -> Change {
        let before_hash = self
            .old_data
            .as_deref()
            .map_or(Hash::ZERO, |s| scribe_hash::hash(s.as_bytes()));
        let after_hash = self
            .new_data
            .as_deref()
            .map_or(Hash::ZERO, |s| scribe_hash::hash(s.as_bytes()));
        Change::new(self.table, self.operation, self.primary_key, before_hash, after_hash)
    }
}

/// How to acknowledge a [`Batch`] at the source once it is durably committed.
///
/// Carries its own `PgPool` handle (cheap to clone — it is itself
/// reference-counted) rather than relying on the monitor to still be holding
/// the same connection by the time acknowledgement happens: the batch may
/// sit in the writer's channel for a while, and acknowledging a batch before
/// it is durably stored would mean a crash between the two could lose the
/// change for good, since there would be nothing left upstream to redeliver
/// it from.
#[derive(Debug, Clone)]
pub enum Ack {
    /// LOGICAL mode: consume exactly one pending transaction from the
    /// replication slot, advancing past this batch only.
    Logical {
        /// The pool the batch was polled from.
        pool: PgPool,
        /// The slot to advance.
        slot_name: String,
    },
    /// TRIGGER mode: mark these `scribe_audit` row ids processed.
    Trigger {
        /// The pool the batch was polled from.
        pool: PgPool,
        /// The `scribe_audit.id` values this batch covers.
        ids: Vec<i64>,
    },
    /// Nothing to acknowledge at a source. Used by tests that exercise the
    /// writer in isolation, without a live upstream connection.
    #[cfg(test)]
    None,
}

/// A group of [`RawChange`]s that become a single commit, tagged with the
/// upstream transaction id when the source can supply one (LOGICAL mode).
/// TRIGGER mode has no transaction boundary to report and leaves `xid`
/// unset; the whole poll cycle becomes one commit.
#[derive(Debug, Clone)]
pub struct Batch {
    /// The upstream transaction id, if known.
    pub xid: Option<i64>,
    /// The row mutations belonging to this batch, in capture order.
    pub changes: Vec<RawChange>,
    /// How to acknowledge this batch at the source once it is stored.
    pub ack: Ack,
}
