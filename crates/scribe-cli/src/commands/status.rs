// SPDX-License-Identifier: Apache-2.0
//! `scribe status` — show HEAD and repository configuration.

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Table};
use scribe_core::HEAD;

/// Arguments for `scribe status`.
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Machine-readable, stable output: `head <hex>` or `head (none)`.
    #[arg(long)]
    pub porcelain: bool,
}

/// Print HEAD and configuration.
///
/// # Errors
/// Returns an error if not run inside a repository, or on storage failure.
pub async fn run(args: StatusArgs) -> Result<()> {
    let repo = scribe_core::Repository::open(None).await.context("scribe status")?;
    let head = repo.store().get_ref(HEAD).await?;

    if args.porcelain {
        if head.is_zero() {
            println!("head (none)");
        } else {
            println!("head {}", head.to_hex());
        }
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["field", "value"]);
    table.add_row(vec!["repository".to_string(), repo.root().display().to_string()]);
    table.add_row(vec![
        "HEAD".to_string(),
        if head.is_zero() { "(none)".to_string() } else { head.to_hex() },
    ]);
    table.add_row(vec![
        "author".to_string(),
        format!("{} ({})", repo.config().author_id, repo.config().author_role),
    ]);
    if let Some(conn) = &repo.config().pg_connection_string {
        table.add_row(vec!["pg connection".to_string(), conn.clone()]);
    }
    if !repo.config().watched_tables.is_empty() {
        table.add_row(vec!["watched tables".to_string(), repo.config().watched_tables.join(", ")]);
    }
    println!("{table}");
    Ok(())
}
