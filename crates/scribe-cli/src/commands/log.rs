// SPDX-License-Identifier: Apache-2.0
//! `scribe log` — walk commit history.

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Table};
use scribe_hash::Hash;
use serde::Serialize;
use std::str::FromStr as _;

/// Arguments for `scribe log`.
#[derive(Debug, Args)]
#[command(group(clap::ArgGroup::new("format").args(["oneline", "json"])))]
pub struct LogArgs {
    /// One line per commit: `<12-char id> <message>`.
    #[arg(long)]
    pub oneline: bool,
    /// Emit a JSON array of commits instead of text.
    #[arg(long)]
    pub json: bool,
    /// Maximum number of commits to show.
    #[arg(short = 'n', long = "num", default_value_t = 10)]
    pub num: usize,
    /// Only show commits by this author id.
    #[arg(short = 'a', long = "author")]
    pub author: Option<String>,
    /// Only show commits from this process name.
    #[arg(short = 'p', long = "process")]
    pub process: Option<String>,
    /// Start walking from this commit instead of HEAD.
    pub commit: Option<String>,
}

#[derive(Serialize)]
struct LogEntry {
    commit_id: String,
    parent_id: String,
    author_id: String,
    process_name: String,
    timestamp: i64,
    message: Option<String>,
    changes: usize,
}

/// List commits per `args`.
///
/// # Errors
/// Returns an error if not run inside a repository, if `COMMIT` is not
/// valid hex, or on storage failure.
pub async fn run(args: LogArgs) -> Result<()> {
    let repo = scribe_core::Repository::open(None).await.context("scribe log")?;
    let store = repo.store();

    let hashes = if let Some(author) = &args.author {
        store.find_by_author(author).await?
    } else if let Some(process) = &args.process {
        store.find_by_process(process).await?
    } else {
        let from = args
            .commit
            .as_deref()
            .map(Hash::from_str)
            .transpose()
            .context("COMMIT must be a valid hash")?;
        store.get_history(from, args.num).await?
    };

    let mut entries = Vec::new();
    for hash in hashes.into_iter().take(args.num) {
        if let Some(env) = store.load_commit(hash).await? {
            entries.push(LogEntry {
                commit_id: env.commit_id.to_hex(),
                parent_id: env.parent_id.to_hex(),
                author_id: env.author.id,
                process_name: env.process.name,
                timestamp: env.timestamp,
                message: env.message,
                changes: env.changes.len(),
            });
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if args.oneline {
        for entry in &entries {
            println!("{} {}", &entry.commit_id[..12], entry.message.as_deref().unwrap_or(""));
        }
    } else {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_header(vec!["commit", "author", "process", "message"]);
        for entry in &entries {
            table.add_row(vec![
                entry.commit_id[..12].to_string(),
                entry.author_id.clone(),
                entry.process_name.clone(),
                entry.message.clone().unwrap_or_default(),
            ]);
        }
        println!("{table}");
    }
    Ok(())
}
