// SPDX-License-Identifier: Apache-2.0
//! `scribe verify` — walk the commit chain and re-check every envelope.

use anyhow::{bail, Context, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Table};
use scribe_hash::Hash;
use std::str::FromStr as _;

/// Arguments for `scribe verify`.
#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Print a per-commit pass/fail table instead of only the summary.
    #[arg(long)]
    pub verbose: bool,
    /// Walk the entire chain rather than stopping at the first failure.
    #[arg(long)]
    pub full: bool,
    /// Start walking from this commit instead of HEAD.
    pub commit: Option<String>,
}

/// Verify the commit chain.
///
/// # Errors
/// Returns an error (causing a non-zero exit) if any commit in the walked
/// range fails verification, if not run inside a repository, or if
/// `COMMIT` is not valid hex.
pub async fn run(args: VerifyArgs) -> Result<()> {
    let repo = scribe_core::Repository::open(None).await.context("scribe verify")?;
    let from = args
        .commit
        .as_deref()
        .map(Hash::from_str)
        .transpose()
        .context("COMMIT must be a valid hash")?;

    let results = repo.store().verify_chain(from).await?;

    if args.verbose {
        // --verbose always reports every visited commit; --full only
        // affects whether the non-verbose summary below stops counting at
        // the first failure.
        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_header(vec!["commit", "status"]);
        for (hash, result) in &results {
            let status = if result.is_ok() { "OK" } else { "FAILED" };
            table.add_row(vec![hash.to_hex(), status.to_string()]);
        }
        println!("{table}");
    }

    let mut failures = 0usize;
    for (_, result) in &results {
        if result.is_err() {
            failures += 1;
            if !args.full && !args.verbose {
                break;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} commit(s) failed verification");
    }
    println!("{} commit(s) verified OK", results.len());
    Ok(())
}
