// SPDX-License-Identifier: Apache-2.0
//! `scribe commit` — record a manual commit.

use anyhow::{bail, Context, Result};
use clap::Args;
use scribe_core::{Author, Envelope, Operation, Process, HEAD};
use scribe_objects::{BlobStore, FsObjectStore};
use std::str::FromStr as _;

/// Arguments for `scribe commit`.
#[derive(Debug, Args)]
pub struct CommitArgs {
    /// Commit message.
    #[arg(short = 'm', long = "message")]
    pub message: String,
    /// Author id, overriding the repository default.
    #[arg(short = 'a', long = "author")]
    pub author: Option<String>,
    /// Author role, overriding the repository default.
    #[arg(short = 'r', long = "role")]
    pub role: Option<String>,
    /// Process name recorded on the commit.
    #[arg(short = 'p', long = "process", default_value = "scribe-cli")]
    pub process: String,
    /// Process version string.
    #[arg(short = 'V', long = "process-version")]
    pub version: Option<String>,
    /// Table the change applies to. Requires `--operation` and `--data`.
    #[arg(short = 't', long = "table", requires_all = ["operation", "data"])]
    pub table: Option<String>,
    /// The kind of mutation (`INSERT`, `UPDATE`, `DELETE`).
    #[arg(short = 'o', long = "operation")]
    pub operation: Option<String>,
    /// JSON-encoded new row value for the change.
    #[arg(short = 'd', long = "data")]
    pub data: Option<String>,
}

/// Build and store one manual commit.
///
/// # Errors
/// Returns an error if not run inside a repository, if `--operation` is not
/// a recognised mutation kind, or on storage failure.
pub async fn run(args: CommitArgs) -> Result<()> {
    let repo = scribe_core::Repository::open(None).await.context("scribe commit")?;

    let author_id = args.author.unwrap_or_else(|| repo.config().author_id.clone());
    let author_role = args.role.unwrap_or_else(|| repo.config().author_role.clone());
    let author = Author::new(author_id, author_role);

    let mut process = Process::new(args.process);
    process.version = args.version;

    let head = repo.store().get_ref(HEAD).await.unwrap_or(scribe_hash::Hash::ZERO);
    let mut env = Envelope::new(author, process);
    env.set_parent(head);
    env.set_message(args.message);

    if let Some(table) = args.table {
        let Some(operation_str) = args.operation else {
            bail!("--table requires --operation");
        };
        let Some(data) = args.data else {
            bail!("--table requires --data");
        };
        let operation = Operation::from_str(&operation_str.to_uppercase())
            .map_err(|e| anyhow::anyhow!("invalid --operation {operation_str:?}: {e}"))?;
        let primary_key = extract_primary_key(&data)?;
        let after_hash = if operation == Operation::Delete {
            scribe_hash::Hash::ZERO
        } else {
            scribe_hash::hash(data.as_bytes())
        };
        let before_hash = if operation == Operation::Insert {
            scribe_hash::Hash::ZERO
        } else {
            scribe_hash::hash(data.as_bytes())
        };

        let expected_hash = if after_hash.is_zero() { before_hash } else { after_hash };
        let objects = FsObjectStore::new(repo.objects_path());
        objects
            .put_verified(expected_hash, data.as_bytes())
            .context("failed to write change payload to the blob sink")?;

        env.add_change(table, operation, primary_key, before_hash, after_hash);
    }

    env.finalize();
    repo.store().store_commit(&env).await?;
    repo.store().set_ref(HEAD, env.commit_id).await?;

    println!("{}", env.commit_id);
    Ok(())
}

/// Best-effort primary key extraction: reuse the row JSON's `id` field if
/// present, else the whole payload.
fn extract_primary_key(data: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(data).context("--data must be valid JSON")?;
    let pk = value.get("id").map_or_else(
        || value.clone(),
        |id| serde_json::json!({ "id": id }),
    );
    Ok(pk.to_string())
}
