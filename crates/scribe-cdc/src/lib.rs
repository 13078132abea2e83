// SPDX-License-Identifier: Apache-2.0
//! Change-data-capture ingestion: turns row-level mutations on an upstream
//! PostgreSQL database into [`scribe_core::Envelope`] commits.
//!
//! Two capture mechanisms are supported, selected by [`CdcMode`]: `Trigger`
//! (an audit table fed by AFTER-ROW triggers, polled on an interval) and
//! `Logical` (a `wal2json`-decoded logical replication slot). Both feed the
//! same [`monitor::Monitor`] state machine and writer task.
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
    clippy::multiple_crate_versions,
    clippy::missing_errors_doc
)]

mod change;
pub mod config;
pub mod logical;
pub mod monitor;
pub mod trigger;

pub use change::{Batch, RawChange};
pub use config::{CdcConfig, CdcMode};
pub use monitor::{Monitor, MonitorState};
