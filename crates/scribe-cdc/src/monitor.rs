// SPDX-License-Identifier: Apache-2.0
//! The ingestion loop: a monitor task that owns the upstream connection and
//! drives the state machine below, and a writer task that owns the commit
//! store, kept apart so upstream I/O and storage I/O overlap instead of
//! serializing through one task.
//!
//! ```text
//! Disconnected -> Connecting -> Setup -> Running -> Disconnected  (on error)
//!       ^                                   |
//!       +----------------- Stopping <-------+  (on stop signal, from any state)
//! ```

use crate::change::{Ack, Batch};
use crate::config::{CdcConfig, CdcMode};
use crate::{logical, trigger};
use scribe_core::{Author, CommitStore, Envelope, Hash, Process, Result, ScribeError, HEAD};
use scribe_objects::{BlobStore, FsObjectStore};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, instrument, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const CHANNEL_CAPACITY: usize = 64;

/// A point in the CDC state machine. Exposed for observability
/// (`scribe watch` reports it); the loop itself never inspects it from the
/// outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// No upstream connection is held.
    Disconnected,
    /// Attempting to open the upstream connection.
    Connecting,
    /// Connected; installing triggers or the replication slot.
    Setup,
    /// Connected and polling on an interval.
    Running,
    /// Shutting down in response to a stop signal.
    Stopping,
}

/// Drives one watch session: connect, set up capture, poll, dispatch,
/// repeat, reconnecting on transient failure until told to stop.
pub struct Monitor {
    config: CdcConfig,
}

impl Monitor {
    /// Build a monitor for `config`. Does not connect until [`Self::run`].
    #[must_use]
    pub const fn new(config: CdcConfig) -> Self {
        Self { config }
    }

    /// Run until `stop` is set to `true`. Each session (one connect + setup
    /// + poll loop) runs until it errors or a stop is observed; on error the
    /// loop waits [`RECONNECT_DELAY`] and tries again, unless a stop has
    /// since been requested.
    ///
    /// Captured changes are handed to an internal writer task over a
    /// bounded channel, so a slow commit-store write never blocks the next
    /// poll from being issued. When `objects` is `Some`, the writer also
    /// populates it with each change's raw row payload(s) — the optional
    /// content-addressed blob sink for Merkle leaves; when `None`, the
    /// writer stores only the commit chain, never the payload bytes.
    ///
    /// # Errors
    /// Returns an error only if the writer task itself fails (a storage
    /// error propagated from [`CommitStore::store_commit_idempotent`] or
    /// from writing to `objects`); upstream connection failures are retried
    /// internally and never surface here.
    #[instrument(skip_all)]
    pub async fn run(
        &self,
        store: Arc<CommitStore>,
        objects: Option<Arc<FsObjectStore>>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<()> {
        let (tx, rx) = mpsc::channel::<Batch>(CHANNEL_CAPACITY);
        let writer_handle = tokio::spawn(write_loop(store, objects, rx));

        while !*stop.borrow() {
            match self.run_session(&tx, &mut stop).await {
                Ok(()) => break,
                Err(e) => {
                    warn!(error = %e, "cdc session ended, reconnecting");
                    tokio::select! {
                        () = tokio::time::sleep(RECONNECT_DELAY) => {}
                        _ = stop.changed() => {}
                    }
                }
            }
        }

        drop(tx);
        writer_handle
            .await
            .map_err(|e| ScribeError::Io(format!("writer task panicked: {e}")))??;
        Ok(())
    }

    async fn run_session(&self, tx: &mpsc::Sender<Batch>, stop: &mut watch::Receiver<bool>) -> Result<()> {
        info!(mode = ?self.config.mode, "connecting to upstream");
        let pool = PgPool::connect(&self.config.connection_string)
            .await
            .map_err(|e| ScribeError::PgConnect(e.to_string()))?;

        match self.config.mode {
            CdcMode::Trigger => trigger::setup(&pool, &self.config.tables).await?,
            CdcMode::Logical => {
                logical::setup(
                    &pool,
                    &self.config.slot_name,
                    &self.config.publication_name,
                    &self.config.tables,
                )
                .await?;
            }
        }
        info!("capture installed, entering poll loop");

        loop {
            if *stop.borrow() {
                return Ok(());
            }

            let batches = match self.config.mode {
                CdcMode::Trigger => trigger::poll(&pool).await?,
                CdcMode::Logical => logical::poll(&pool, &self.config.slot_name).await?,
            };

            for batch in batches {
                tx.send(batch)
                    .await
                    .map_err(|_| ScribeError::Io("writer task closed its channel".to_string()))?;
            }

            tokio::select! {
                () = tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)) => {}
                _ = stop.changed() => {}
            }
        }
    }
}

/// Connect and install the capture machinery for `config` (audit table and
/// triggers, or replication slot/publication/replica identity), then
/// return without entering the poll loop. Used by `scribe watch -S`.
///
/// # Errors
/// Returns [`ScribeError::PgConnect`], [`ScribeError::PgQuery`], or
/// [`ScribeError::PgReplication`] on failure.
pub async fn setup_only(config: &CdcConfig) -> Result<()> {
    let pool = PgPool::connect(&config.connection_string)
        .await
        .map_err(|e| ScribeError::PgConnect(e.to_string()))?;
    match config.mode {
        CdcMode::Trigger => trigger::setup(&pool, &config.tables).await,
        CdcMode::Logical => {
            logical::setup(&pool, &config.slot_name, &config.publication_name, &config.tables).await
        }
    }
}

/// Stop a running monitor (TRIGGER mode only; LOGICAL mode additionally
/// drops its replication slot) by tearing down the capture machinery it
/// installed.
///
/// # Errors
/// Returns [`ScribeError::PgQuery`] or [`ScribeError::PgReplication`] on
/// failure.
pub async fn teardown(config: &CdcConfig) -> Result<()> {
    let pool = PgPool::connect(&config.connection_string)
        .await
        .map_err(|e| ScribeError::PgConnect(e.to_string()))?;
    match config.mode {
        CdcMode::Trigger => trigger::cleanup(&pool, &config.tables).await,
        CdcMode::Logical => logical::drop_slot(&pool, &config.slot_name).await,
    }
}

/// Builds and stores one commit per batch, advancing `HEAD`, then
/// acknowledges the batch at its source. Runs as its own task so the
/// monitor loop never blocks on a commit-store write.
///
/// Acknowledgement happens strictly after `store_commit_idempotent` and
/// `set_ref` both return `Ok`: a batch is only ever consumed from the
/// source (the `scribe_audit` rows marked processed, or the replication
/// slot advanced) once it is durably part of the chain. If the process
/// crashes before that point, the batch is still pending at the source and
/// the next run replays it instead of losing it.
async fn write_loop(
    store: Arc<CommitStore>,
    objects: Option<Arc<FsObjectStore>>,
    mut rx: mpsc::Receiver<Batch>,
) -> Result<()> {
    while let Some(batch) = rx.recv().await {
        if batch.changes.is_empty() {
            continue;
        }

        let parent = store.get_ref(HEAD).await.unwrap_or(Hash::ZERO);

        let author = Author::new("service:scribe-watch", "automated");

        let process_name = batch.xid.map_or_else(|| "pg_txid:unknown".to_string(), |xid| format!("pg_txid:{xid}"));
        let mut process = Process::new(process_name);
        process.version = Some("postgresql-cdc".to_string());

        let mut env = Envelope::new(author, process);
        env.set_parent(parent);
        for raw in batch.changes {
            if let Some(objects) = &objects {
                if let Some(data) = &raw.old_data {
                    objects.put(data.as_bytes()).map_err(|e| ScribeError::Io(e.to_string()))?;
                }
                if let Some(data) = &raw.new_data {
                    objects.put(data.as_bytes()).map_err(|e| ScribeError::Io(e.to_string()))?;
                }
            }
            let change = raw.into_change();
            env.add_change(
                change.table,
                change.operation,
                change.primary_key,
                change.before_hash,
                change.after_hash,
            );
        }
        env.finalize();

        store.store_commit_idempotent(&env).await?;
        store.set_ref(HEAD, env.commit_id).await?;

        match batch.ack {
            Ack::Logical { pool, slot_name } => logical::ack(&pool, &slot_name).await?,
            Ack::Trigger { pool, ids } => trigger::ack(&pool, &ids).await?,
            #[cfg(test)]
            Ack::None => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_loop_stores_a_commit_per_batch_and_advances_head() {
        let store = Arc::new(CommitStore::open_in_memory().await.unwrap());
        let objects_dir = tempfile::tempdir().unwrap();
        let objects = Arc::new(FsObjectStore::new(objects_dir.path()));
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(write_loop(Arc::clone(&store), Some(Arc::clone(&objects)), rx));

        tx.send(Batch {
            xid: Some(42),
            changes: vec![crate::change::RawChange {
                table: "users".to_string(),
                operation: scribe_core::Operation::Insert,
                primary_key: r#"{"id":1}"#.to_string(),
                old_data: None,
                new_data: Some(r#"{"id":1,"x":1}"#.to_string()),
            }],
            ack: Ack::None,
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap().unwrap();

        let head = store.get_ref(HEAD).await.unwrap();
        assert!(!head.is_zero());
        let commit = store.load_commit(head).await.unwrap().unwrap();
        assert_eq!(commit.process.name, "pg_txid:42");
        assert_eq!(commit.changes.len(), 1);
        assert!(commit.changes[0].before_hash.is_zero());
        assert!(!commit.changes[0].after_hash.is_zero());
        assert!(objects.has(commit.changes[0].after_hash).unwrap());
    }

    #[tokio::test]
    async fn write_loop_falls_back_to_unknown_xid() {
        let store = Arc::new(CommitStore::open_in_memory().await.unwrap());
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(write_loop(Arc::clone(&store), None, rx));

        tx.send(Batch {
            xid: None,
            changes: vec![crate::change::RawChange {
                table: "users".to_string(),
                operation: scribe_core::Operation::Delete,
                primary_key: r#"{"id":1}"#.to_string(),
                old_data: Some(r#"{"id":1,"x":1}"#.to_string()),
                new_data: None,
            }],
            ack: Ack::None,
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap().unwrap();

        let head = store.get_ref(HEAD).await.unwrap();
        let commit = store.load_commit(head).await.unwrap().unwrap();
        assert_eq!(commit.process.name, "pg_txid:unknown");
    }
}
