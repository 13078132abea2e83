// SPDX-License-Identifier: Apache-2.0
//! `scribe`: the command-line interface to the lineage engine.
//!
//! Thin and un-opinionated about terminal styling — no color, no progress
//! bars — but functional: repository lifecycle (`init`), manual commits,
//! history inspection (`log`, `status`), chain verification (`verify`) and
//! CDC ingestion (`watch`).
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
    clippy::dbg_macro
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::module_name_repetitions,
    clippy::use_self,
    clippy::multiple_crate_versions,
    clippy::missing_errors_doc,
    clippy::print_stdout,
    clippy::print_stderr
)]

mod commands;

use clap::{Parser, Subcommand};

/// The Scribe lineage engine CLI.
#[derive(Debug, Parser)]
#[command(name = "scribe", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a new repository.
    Init(commands::init::InitArgs),
    /// Record a manual commit.
    Commit(commands::commit::CommitArgs),
    /// Walk commit history.
    Log(commands::log::LogArgs),
    /// Show HEAD and repository configuration.
    Status(commands::status::StatusArgs),
    /// Verify the commit chain.
    Verify(commands::verify::VerifyArgs),
    /// Start (or set up / tear down) CDC ingestion.
    Watch(commands::watch::WatchArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Init(args) => commands::init::run(args).await,
        Command::Commit(args) => commands::commit::run(args).await,
        Command::Log(args) => commands::log::run(args).await,
        Command::Status(args) => commands::status::run(args).await,
        Command::Verify(args) => commands::verify::run(args).await,
        Command::Watch(args) => commands::watch::run(args).await,
    };

    if let Err(e) = &result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
    result
}
