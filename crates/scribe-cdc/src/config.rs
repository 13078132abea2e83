// SPDX-License-Identifier: Apache-2.0
//! Configuration for a single CDC watch session.

/// Which upstream mechanism a watch session captures changes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdcMode {
    /// An audit table plus AFTER-ROW triggers, polled on an interval.
    Trigger,
    /// A logical replication slot decoded with the `wal2json` output plugin.
    Logical,
}

/// Settings for one [`crate::monitor::Monitor`] run.
#[derive(Debug, Clone)]
pub struct CdcConfig {
    /// `postgres://...` connection string for the watched database.
    pub connection_string: String,
    /// Tables to capture. Empty means "all tables" in `Logical` mode; in
    /// `Trigger` mode at least one table must be named.
    pub tables: Vec<String>,
    /// How often to poll for new changes.
    pub poll_interval_ms: u64,
    /// Replication slot name (`Logical` mode only).
    pub slot_name: String,
    /// Publication name (`Logical` mode only).
    pub publication_name: String,
    /// Which capture mechanism to use.
    pub mode: CdcMode,
}

impl CdcConfig {
    /// Build a config with the stated defaults: 1000ms polling, slot
    /// `scribe_slot`, publication `scribe_pub`.
    #[must_use]
    pub fn new(connection_string: impl Into<String>, tables: Vec<String>, mode: CdcMode) -> Self {
        Self {
            connection_string: connection_string.into(),
            tables,
            poll_interval_ms: 1000,
            slot_name: "scribe_slot".to_string(),
            publication_name: "scribe_pub".to_string(),
            mode,
        }
    }
}
