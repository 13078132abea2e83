// SPDX-License-Identifier: Apache-2.0
//! The embedded commit store: `commits`, `changes` and `refs` tables over
//! SQLite, with history traversal and chain verification.
//!
//! The content-addressed blob sink described in the data model's optional
//! `objects` table is realised separately, as a filesystem content-addressed
//! store (`scribe-objects`) rather than a DB-resident blob table — the
//! commit index here remains the sole authoritative store for commits.

use crate::error::{Result, ScribeError};
use crate::model::{Author, Change, Envelope, Operation, Process};
use scribe_hash::Hash;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr as _;
use tracing::{debug, instrument};

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS commits (
    hash TEXT PRIMARY KEY,
    parent_hash TEXT,
    tree_hash TEXT NOT NULL,
    author_id TEXT NOT NULL,
    author_role TEXT NOT NULL,
    author_email TEXT,
    process_name TEXT NOT NULL,
    process_version TEXT,
    process_params TEXT,
    process_source TEXT,
    message TEXT,
    timestamp INTEGER NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_commits_parent ON commits(parent_hash);
CREATE INDEX IF NOT EXISTS idx_commits_author ON commits(author_id);
CREATE INDEX IF NOT EXISTS idx_commits_process ON commits(process_name);
CREATE INDEX IF NOT EXISTS idx_commits_timestamp ON commits(timestamp);
CREATE TABLE IF NOT EXISTS changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    commit_hash TEXT NOT NULL,
    table_name TEXT NOT NULL,
    operation TEXT NOT NULL CHECK(operation IN ('INSERT', 'UPDATE', 'DELETE')),
    primary_key TEXT NOT NULL,
    before_hash TEXT,
    after_hash TEXT,
    created_at TEXT DEFAULT (datetime('now')),
    FOREIGN KEY (commit_hash) REFERENCES commits(hash)
);
CREATE INDEX IF NOT EXISTS idx_changes_commit ON changes(commit_hash);
CREATE INDEX IF NOT EXISTS idx_changes_table ON changes(table_name);
CREATE TABLE IF NOT EXISTS refs (
    name TEXT PRIMARY KEY,
    hash TEXT NOT NULL,
    updated_at TEXT DEFAULT (datetime('now'))
);
INSERT OR IGNORE INTO refs (name, hash) VALUES ('HEAD', '');
";

/// The name of the single reference this system maintains.
pub const HEAD: &str = "HEAD";

/// A durable, SQLite-backed index of commits, changes and named references.
///
/// Cheaply [`Clone`]able: the underlying [`SqlitePool`] is itself
/// reference-counted, so a clone shares the same connection pool rather
/// than opening a second one.
#[derive(Clone)]
pub struct CommitStore {
    pool: SqlitePool,
}

impl CommitStore {
    /// Open (creating if absent) a commit store at `path`, enabling foreign
    /// keys and initialising the schema.
    ///
    /// # Errors
    /// Returns [`ScribeError::Db`] if the connection or schema init fails.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::query(SCHEMA_SQL).execute(&pool).await?;
        debug!("commit store schema initialised");
        Ok(Self { pool })
    }

    /// Open an in-memory store, used by tests.
    ///
    /// # Errors
    /// Returns [`ScribeError::Db`] if the connection or schema init fails.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::query(SCHEMA_SQL).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Insert a commit row and all its change rows in one transaction.
    ///
    /// # Errors
    /// Returns [`ScribeError::AlreadyExists`] if a commit with the same
    /// hash is already present; [`ScribeError::Db`] on any other failure.
    #[instrument(skip_all, fields(commit_id = %env.commit_id))]
    pub async fn store_commit(&self, env: &Envelope) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let parent_hash = opt_hex(env.parent_id);
        let author_email = env.author.email.as_deref();
        let process_version = env.process.version.as_deref();
        let process_params = env.process.params.as_deref();
        let process_source = env.process.source.as_deref();
        let message = env.message.as_deref();

        sqlx::query(
            "INSERT INTO commits (hash, parent_hash, tree_hash, author_id, author_role, \
             author_email, process_name, process_version, process_params, process_source, \
             message, timestamp) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(env.commit_id.to_hex())
        .bind(parent_hash)
        .bind(env.tree_hash.to_hex())
        .bind(&env.author.id)
        .bind(&env.author.role)
        .bind(author_email)
        .bind(&env.process.name)
        .bind(process_version)
        .bind(process_params)
        .bind(process_source)
        .bind(message)
        .bind(env.timestamp)
        .execute(&mut *tx)
        .await?;

        for change in &env.changes {
            sqlx::query(
                "INSERT INTO changes (commit_hash, table_name, operation, primary_key, \
                 before_hash, after_hash) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(env.commit_id.to_hex())
            .bind(&change.table)
            .bind(change.operation.as_str())
            .bind(&change.primary_key)
            .bind(opt_hex(change.before_hash))
            .bind(opt_hex(change.after_hash))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Advance `HEAD` to `hash`, in its own transaction, separate from
    /// [`Self::store_commit`]. On a crash between the two, the commit is
    /// durable but `HEAD` still points at the previous tip; restarting the
    /// ingestion loop replays the same input, `store_commit` returns
    /// `AlreadyExists` (suppressed), and the `HEAD` advance is retried.
    ///
    /// # Errors
    /// Returns [`ScribeError::Db`] on failure.
    pub async fn set_ref(&self, name: &str, hash: Hash) -> Result<()> {
        sqlx::query(
            "INSERT INTO refs (name, hash, updated_at) VALUES (?, ?, datetime('now')) \
             ON CONFLICT(name) DO UPDATE SET hash = excluded.hash, updated_at = excluded.updated_at",
        )
        .bind(name)
        .bind(hash.to_hex())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Look up a named reference. Returns [`Hash::ZERO`] if the reference
    /// is unset or empty (`HEAD`'s initial value).
    ///
    /// # Errors
    /// Returns [`ScribeError::NotFound`] if no row exists for `name` at
    /// all (as opposed to an empty/zero value), and
    /// [`ScribeError::RepoCorrupt`] if the stored value is not valid hex.
    pub async fn get_ref(&self, name: &str) -> Result<Hash> {
        let row = sqlx::query("SELECT hash FROM refs WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Err(ScribeError::NotFound(format!("ref {name}")));
        };
        let hex: String = row.try_get("hash")?;
        if hex.is_empty() {
            return Ok(Hash::ZERO);
        }
        Hash::from_hex(&hex).map_err(|e| ScribeError::RepoCorrupt(format!("ref {name}: {e}")))
    }

    /// Store `store_commit` then idempotently suppress
    /// [`ScribeError::AlreadyExists`] — the replay-safe entry point the
    /// ingestion loop uses after a crash.
    pub async fn store_commit_idempotent(&self, env: &Envelope) -> Result<()> {
        match self.store_commit(env).await {
            Ok(()) | Err(ScribeError::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Returns `true` if a commit with this hash is present.
    ///
    /// # Errors
    /// Returns [`ScribeError::Db`] on failure.
    pub async fn exists(&self, hash: Hash) -> Result<bool> {
        let row = sqlx::query("SELECT 1 AS present FROM commits WHERE hash = ?")
            .bind(hash.to_hex())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Re-materialise the full envelope (header + changes, insertion
    /// order) for `hash`.
    ///
    /// # Errors
    /// Returns [`ScribeError::Db`] on failure, `Ok(None)` if absent.
    pub async fn load_commit(&self, hash: Hash) -> Result<Option<Envelope>> {
        let row = sqlx::query(
            "SELECT hash, parent_hash, tree_hash, author_id, author_role, author_email, \
             process_name, process_version, process_params, process_source, message, timestamp \
             FROM commits WHERE hash = ?",
        )
        .bind(hash.to_hex())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let commit_id: String = row.try_get("hash")?;
        let parent_hash: Option<String> = row.try_get("parent_hash")?;
        let tree_hash: String = row.try_get("tree_hash")?;
        let author_id: String = row.try_get("author_id")?;
        let author_role: String = row.try_get("author_role")?;
        let author_email: Option<String> = row.try_get("author_email")?;
        let process_name: String = row.try_get("process_name")?;
        let process_version: Option<String> = row.try_get("process_version")?;
        let process_params: Option<String> = row.try_get("process_params")?;
        let process_source: Option<String> = row.try_get("process_source")?;
        let message: Option<String> = row.try_get("message")?;
        let timestamp: i64 = row.try_get("timestamp")?;

        let change_rows = sqlx::query(
            "SELECT table_name, operation, primary_key, before_hash, after_hash FROM changes \
             WHERE commit_hash = ? ORDER BY id ASC",
        )
        .bind(&commit_id)
        .fetch_all(&self.pool)
        .await?;

        let mut changes = Vec::with_capacity(change_rows.len());
        for r in change_rows {
            let table_name: String = r.try_get("table_name")?;
            let operation: String = r.try_get("operation")?;
            let primary_key: String = r.try_get("primary_key")?;
            let before_hash: Option<String> = r.try_get("before_hash")?;
            let after_hash: Option<String> = r.try_get("after_hash")?;
            changes.push(Change::new(
                table_name,
                Operation::from_str(&operation)?,
                primary_key,
                parse_opt_hex(before_hash)?,
                parse_opt_hex(after_hash)?,
            ));
        }

        Ok(Some(Envelope {
            commit_id: Hash::from_hex(&commit_id)
                .map_err(|e| ScribeError::RepoCorrupt(e.to_string()))?,
            parent_id: parse_opt_hex(parent_hash)?,
            tree_hash: Hash::from_hex(&tree_hash)
                .map_err(|e| ScribeError::RepoCorrupt(e.to_string()))?,
            author: Author {
                id: author_id,
                role: author_role,
                email: author_email,
            },
            process: Process {
                name: process_name,
                version: process_version,
                params: process_params,
                source: process_source,
            },
            timestamp,
            message,
            changes,
        }))
    }

    /// Walk the `parent_hash` chain starting at `from` (or `HEAD` if
    /// `None`/zero), stopping at the zero-hash parent or `limit` entries,
    /// whichever comes first.
    ///
    /// # Errors
    /// Returns [`ScribeError::RepoCorrupt`] if a non-zero parent hash is
    /// referenced but absent from the store.
    pub async fn get_history(&self, from: Option<Hash>, limit: usize) -> Result<Vec<Hash>> {
        let mut current = match from {
            Some(h) if !h.is_zero() => h,
            _ => self.get_ref(HEAD).await.unwrap_or(Hash::ZERO),
        };
        let mut out = Vec::new();
        while !current.is_zero() && out.len() < limit {
            let row = sqlx::query("SELECT parent_hash FROM commits WHERE hash = ?")
                .bind(current.to_hex())
                .fetch_optional(&self.pool)
                .await?;
            let Some(row) = row else {
                return Err(ScribeError::RepoCorrupt(format!(
                    "missing commit {current} reached via parent link"
                )));
            };
            out.push(current);
            let parent_hash: Option<String> = row.try_get("parent_hash")?;
            current = parse_opt_hex(parent_hash)?;
        }
        Ok(out)
    }

    /// Commits authored by `author_id`, newest first.
    ///
    /// # Errors
    /// Returns [`ScribeError::Db`] on failure.
    pub async fn find_by_author(&self, author_id: &str) -> Result<Vec<Hash>> {
        let rows = sqlx::query(
            "SELECT hash FROM commits WHERE author_id = ? ORDER BY timestamp DESC",
        )
        .bind(author_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| {
                let hex: String = r.try_get("hash")?;
                Hash::from_hex(&hex).map_err(|e| ScribeError::RepoCorrupt(e.to_string()))
            })
            .collect()
    }

    /// Commits produced by process `process_name`, newest first.
    ///
    /// # Errors
    /// Returns [`ScribeError::Db`] on failure.
    pub async fn find_by_process(&self, process_name: &str) -> Result<Vec<Hash>> {
        let rows = sqlx::query(
            "SELECT hash FROM commits WHERE process_name = ? ORDER BY timestamp DESC",
        )
        .bind(process_name)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| {
                let hex: String = r.try_get("hash")?;
                Hash::from_hex(&hex).map_err(|e| ScribeError::RepoCorrupt(e.to_string()))
            })
            .collect()
    }

    /// Walk the chain from `from` (or `HEAD`), re-running envelope
    /// `verify()` on each commit and confirming a non-zero `parent_id`
    /// resolves. Returns one `(hash, Result<()>)` pair per commit visited;
    /// the walk itself fails only if a parent link is missing.
    ///
    /// # Errors
    /// Returns [`ScribeError::RepoCorrupt`] if a parent link is missing.
    pub async fn verify_chain(&self, from: Option<Hash>) -> Result<Vec<(Hash, Result<()>)>> {
        let history = self.get_history(from, usize::MAX).await?;
        let mut out = Vec::with_capacity(history.len());
        for hash in history {
            let result = match self.load_commit(hash).await? {
                None => Err(ScribeError::ObjectMissing(hash.to_string()).into_repo_corrupt()),
                Some(env) => match env.verify() {
                    Ok(()) if env.parent_id.is_zero() => Ok(()),
                    Ok(()) => {
                        if self.exists(env.parent_id).await? {
                            Ok(())
                        } else {
                            Err(ScribeError::RepoCorrupt(format!(
                                "commit {hash} references missing parent {}",
                                env.parent_id
                            )))
                        }
                    }
                    Err(e) => Err(e),
                },
            };
            out.push((hash, result));
        }
        Ok(out)
    }
}

fn opt_hex(h: Hash) -> Option<String> {
    if h.is_zero() {
        None
    } else {
        Some(h.to_hex())
    }
}

fn parse_opt_hex(s: Option<String>) -> Result<Hash> {
    match s {
        None => Ok(Hash::ZERO),
        Some(s) if s.is_empty() => Ok(Hash::ZERO),
        Some(s) => Hash::from_hex(&s).map_err(|e| ScribeError::RepoCorrupt(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Author, Process};

    async fn fresh_store() -> CommitStore {
        CommitStore::open_in_memory().await.unwrap()
    }

    fn root_commit() -> Envelope {
        let mut env = Envelope::new(Author::new("user:alice", "developer"), Process::new("test"));
        env.add_change(
            "users",
            Operation::Insert,
            r#"{"id":1}"#,
            Hash::ZERO,
            scribe_hash::hash(b"row"),
        );
        env.finalize();
        env
    }

    #[tokio::test]
    async fn head_starts_at_zero() {
        let store = fresh_store().await;
        assert_eq!(store.get_ref(HEAD).await.unwrap(), Hash::ZERO);
    }

    #[tokio::test]
    async fn store_then_load_round_trips() {
        let store = fresh_store().await;
        let env = root_commit();
        store.store_commit(&env).await.unwrap();
        let loaded = store.load_commit(env.commit_id).await.unwrap().unwrap();
        assert_eq!(loaded, env);
    }

    #[tokio::test]
    async fn duplicate_store_returns_already_exists() {
        let store = fresh_store().await;
        let env = root_commit();
        store.store_commit(&env).await.unwrap();
        let err = store.store_commit(&env).await.unwrap_err();
        assert!(matches!(err, ScribeError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn idempotent_store_suppresses_already_exists() {
        let store = fresh_store().await;
        let env = root_commit();
        store.store_commit(&env).await.unwrap();
        store.store_commit_idempotent(&env).await.unwrap();
    }

    #[tokio::test]
    async fn history_walks_parent_chain_newest_first() {
        let store = fresh_store().await;
        let a = root_commit();
        store.store_commit(&a).await.unwrap();
        store.set_ref(HEAD, a.commit_id).await.unwrap();

        let mut b = Envelope::new(Author::new("user:alice", "developer"), Process::new("test"));
        b.set_parent(a.commit_id);
        b.add_change("users", Operation::Update, r#"{"id":1}"#, a.commit_id, scribe_hash::hash(b"v2"));
        b.finalize();
        store.store_commit(&b).await.unwrap();
        store.set_ref(HEAD, b.commit_id).await.unwrap();

        let history = store.get_history(None, 10).await.unwrap();
        assert_eq!(history, vec![b.commit_id, a.commit_id]);
    }

    #[tokio::test]
    async fn history_missing_parent_is_repo_corrupt() {
        let store = fresh_store().await;
        let mut b = Envelope::new(Author::new("user:alice", "developer"), Process::new("test"));
        b.set_parent(scribe_hash::hash(b"ghost"));
        b.finalize();
        store.store_commit(&b).await.unwrap();
        store.set_ref(HEAD, b.commit_id).await.unwrap();
        let err = store.get_history(None, 10).await.unwrap_err();
        assert!(matches!(err, ScribeError::RepoCorrupt(_)));
    }

    #[tokio::test]
    async fn find_by_author_and_process() {
        let store = fresh_store().await;
        let env = root_commit();
        store.store_commit(&env).await.unwrap();
        assert_eq!(store.find_by_author("user:alice").await.unwrap(), vec![env.commit_id]);
        assert_eq!(store.find_by_process("test").await.unwrap(), vec![env.commit_id]);
        assert!(store.find_by_author("user:bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn verify_chain_reports_per_commit() {
        let store = fresh_store().await;
        let env = root_commit();
        store.store_commit(&env).await.unwrap();
        store.set_ref(HEAD, env.commit_id).await.unwrap();
        let results = store.verify_chain(None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_ok());
    }
}
