// SPDX-License-Identifier: Apache-2.0
//! `scribe init` — create a new repository.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

/// Arguments for `scribe init`.
#[derive(Debug, Args)]
pub struct InitArgs {
    /// Default author id recorded for manual commits.
    #[arg(short = 'a', long = "author", default_value = "user:anonymous")]
    pub author: String,
    /// Default author role recorded for manual commits.
    #[arg(short = 'r', long = "role", default_value = "developer")]
    pub role: String,
    /// Directory to create the repository in (current directory if absent).
    pub path: Option<PathBuf>,
}

/// Create a repository under `args.path` (or the current directory).
///
/// # Errors
/// Returns an error if a repository already exists there, or on I/O/storage
/// failure.
pub async fn run(args: InitArgs) -> Result<()> {
    let repo = scribe_core::Repository::init(args.path.as_deref(), &args.author, &args.role).await?;
    println!("initialized empty Scribe repository at {}", repo.root().display());
    Ok(())
}
