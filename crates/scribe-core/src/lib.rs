// SPDX-License-Identifier: Apache-2.0
//! The verifiable-lineage engine: canonical commit envelopes, the
//! SQLite-backed commit store, history traversal and repository layout.
//!
//! This crate is the authoritative implementation of the commit chain; it
//! never prints and never talks to an upstream database directly — that is
//! `scribe-cdc`'s job, consuming this crate's [`Envelope`] and
//! [`CommitStore`] types.
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

mod canonical;
pub mod config;
mod error;
mod model;
mod repo;
mod store;

pub use canonical::{from_canonical, to_canonical};
pub use error::{Result, ScribeError};
pub use model::{Author, Change, Envelope, Operation, Process};
pub use repo::Repository;
pub use store::{CommitStore, HEAD};

pub use scribe_hash::Hash;
