// SPDX-License-Identifier: Apache-2.0
//! LOGICAL-mode capture: a replication slot decoded with the `wal2json`
//! output plugin, rather than the reference's `pgoutput` — the reference
//! creates its slot with `pgoutput` but never decodes the binary payload it
//! returns, only acknowledging and advancing the slot. `wal2json` emits a
//! JSON payload this module can actually turn into [`RawChange`]s.

use crate::change::{Ack, Batch, RawChange};
use scribe_core::{Operation, Result, ScribeError};
use serde::Deserialize;
use sqlx::{PgPool, Row};

const WAL2JSON_PLUGIN: &str = "wal2json";

/// `true` if the upstream server has `wal_level = logical`, the
/// prerequisite for creating a logical replication slot at all.
///
/// # Errors
/// Returns [`ScribeError::PgQuery`] on failure.
pub async fn logical_replication_available(pool: &PgPool) -> Result<bool> {
    let row = sqlx::query("SHOW wal_level")
        .fetch_one(pool)
        .await
        .map_err(|e| ScribeError::PgQuery(e.to_string()))?;
    let level: String = row.try_get(0).map_err(|e| ScribeError::PgQuery(e.to_string()))?;
    Ok(level == "logical")
}

/// Create the replication slot with the `wal2json` plugin if it does not
/// already exist.
///
/// # Errors
/// Returns [`ScribeError::PgReplication`] on failure.
pub async fn create_slot_if_absent(pool: &PgPool, slot_name: &str) -> Result<()> {
    let row = sqlx::query("SELECT 1 FROM pg_replication_slots WHERE slot_name = $1")
        .bind(slot_name)
        .fetch_optional(pool)
        .await
        .map_err(|e| ScribeError::PgReplication(e.to_string()))?;
    if row.is_some() {
        return Ok(());
    }
    sqlx::query("SELECT pg_create_logical_replication_slot($1, $2)")
        .bind(slot_name)
        .bind(WAL2JSON_PLUGIN)
        .execute(pool)
        .await
        .map_err(|e| ScribeError::PgReplication(e.to_string()))?;
    Ok(())
}

/// Drop the replication slot if it exists.
///
/// # Errors
/// Returns [`ScribeError::PgReplication`] on failure.
pub async fn drop_slot(pool: &PgPool, slot_name: &str) -> Result<()> {
    sqlx::query("SELECT pg_drop_replication_slot($1) WHERE EXISTS (SELECT 1 FROM pg_replication_slots WHERE slot_name = $1)")
        .bind(slot_name)
        .execute(pool)
        .await
        .map_err(|e| ScribeError::PgReplication(e.to_string()))?;
    Ok(())
}

/// Create (or, if it already exists with a different table set, recreate)
/// a publication over `tables`, or `FOR ALL TABLES` if `tables` is empty.
///
/// # Errors
/// Returns [`ScribeError::PgReplication`] on failure.
pub async fn create_or_replace_publication(
    pool: &PgPool,
    publication_name: &str,
    tables: &[String],
) -> Result<()> {
    let exists = sqlx::query("SELECT 1 FROM pg_publication WHERE pubname = $1")
        .bind(publication_name)
        .fetch_optional(pool)
        .await
        .map_err(|e| ScribeError::PgReplication(e.to_string()))?
        .is_some();
    if exists {
        let drop_sql = format!(r#"DROP PUBLICATION "{publication_name}""#);
        sqlx::query(&drop_sql)
            .execute(pool)
            .await
            .map_err(|e| ScribeError::PgReplication(e.to_string()))?;
    }
    let create_sql = if tables.is_empty() {
        format!(r#"CREATE PUBLICATION "{publication_name}" FOR ALL TABLES"#)
    } else {
        let quoted = tables.iter().map(|t| format!(r#""{t}""#)).collect::<Vec<_>>().join(", ");
        format!(r#"CREATE PUBLICATION "{publication_name}" FOR TABLE {quoted}"#)
    };
    sqlx::query(&create_sql)
        .execute(pool)
        .await
        .map_err(|e| ScribeError::PgReplication(e.to_string()))?;
    Ok(())
}

/// Set `REPLICA IDENTITY FULL` on each watched table, so `wal2json` emits
/// full before-images for `UPDATE`/`DELETE` even without a primary key.
///
/// # Errors
/// Returns [`ScribeError::PgReplication`] on failure.
pub async fn set_replica_identity_full(pool: &PgPool, tables: &[String]) -> Result<()> {
    for table in tables {
        let sql = format!(r#"ALTER TABLE "{table}" REPLICA IDENTITY FULL"#);
        sqlx::query(&sql)
            .execute(pool)
            .await
            .map_err(|e| ScribeError::PgReplication(e.to_string()))?;
    }
    Ok(())
}

/// Full one-time setup for LOGICAL mode: checks availability, creates the
/// slot, (re)creates the publication, sets replica identity.
///
/// # Errors
/// Returns [`ScribeError::PgReplication`] if `wal_level` is not `logical`,
/// or any of the underlying steps fail.
pub async fn setup(pool: &PgPool, slot_name: &str, publication_name: &str, tables: &[String]) -> Result<()> {
    if !logical_replication_available(pool).await? {
        return Err(ScribeError::PgReplication(
            "wal_level is not 'logical'; logical replication is unavailable".to_string(),
        ));
    }
    create_slot_if_absent(pool, slot_name).await?;
    create_or_replace_publication(pool, publication_name, tables).await?;
    set_replica_identity_full(pool, tables).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct Wal2JsonMessage {
    xid: Option<i64>,
    #[serde(default)]
    change: Vec<Wal2JsonChange>,
}

#[derive(Debug, Deserialize)]
struct Wal2JsonChange {
    kind: String,
    table: String,
    #[serde(default)]
    columnnames: Vec<String>,
    #[serde(default)]
    columnvalues: Vec<serde_json::Value>,
    oldkeys: Option<Wal2JsonKeys>,
}

#[derive(Debug, Deserialize)]
struct Wal2JsonKeys {
    #[serde(default)]
    keynames: Vec<String>,
    #[serde(default)]
    keyvalues: Vec<serde_json::Value>,
}

fn row_object(names: &[String], values: &[serde_json::Value]) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> =
        names.iter().cloned().zip(values.iter().cloned()).collect();
    serde_json::Value::Object(map)
}

fn decode_change(c: Wal2JsonChange) -> Result<RawChange> {
    let operation = match c.kind.as_str() {
        "insert" => Operation::Insert,
        "update" => Operation::Update,
        "delete" => Operation::Delete,
        other => return Err(ScribeError::PgReplication(format!("unknown wal2json kind {other:?}"))),
    };

    let new_row = (!c.columnnames.is_empty()).then(|| row_object(&c.columnnames, &c.columnvalues));
    let old_row = c.oldkeys.as_ref().map(|k| row_object(&k.keynames, &k.keyvalues));

    let primary_key = old_row
        .clone()
        .or_else(|| new_row.clone())
        .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));

    let (old_data, new_data) = match operation {
        Operation::Insert => (None, new_row.map(|v| v.to_string())),
        Operation::Update => (old_row.map(|v| v.to_string()), new_row.map(|v| v.to_string())),
        Operation::Delete => (old_row.map(|v| v.to_string()), None),
    };

    Ok(RawChange {
        table: c.table,
        operation,
        primary_key: primary_key.to_string(),
        old_data,
        new_data,
    })
}

/// Peek up to 100 pending changes from the slot without consuming them, and
/// decode each `wal2json` payload — one row per committed transaction —
/// into a [`Batch`].
///
/// The slot is left untouched here: the caller must call [`ack`] for each
/// batch only once it is durably stored, so a crash in between still finds
/// the change pending on the slot and replays it rather than losing it.
///
/// # Errors
/// Returns [`ScribeError::PgReplication`] on failure, or if a payload's
/// `kind` is not one of `insert`/`update`/`delete`.
pub async fn poll(pool: &PgPool, slot_name: &str) -> Result<Vec<Batch>> {
    let rows = sqlx::query(
        "SELECT data FROM pg_logical_slot_peek_changes($1, NULL, 100)",
    )
    .bind(slot_name)
    .fetch_all(pool)
    .await
    .map_err(|e| ScribeError::PgReplication(e.to_string()))?;

    let mut out = Vec::new();
    for row in &rows {
        let data: String = row.try_get("data").map_err(|e| ScribeError::PgReplication(e.to_string()))?;
        let message: Wal2JsonMessage =
            serde_json::from_str(&data).map_err(|e| ScribeError::PgReplication(e.to_string()))?;
        let mut changes = Vec::with_capacity(message.change.len());
        for change in message.change {
            changes.push(decode_change(change)?);
        }
        if !changes.is_empty() {
            out.push(Batch {
                xid: message.xid,
                changes,
                ack: Ack::Logical { pool: pool.clone(), slot_name: slot_name.to_string() },
            });
        }
    }

    Ok(out)
}

/// Consume exactly one pending transaction from the slot, advancing past
/// the batch this was called for. Call only after the batch has been
/// durably stored and `HEAD` advanced.
///
/// Peeked batches are processed, and therefore acknowledged, in the order
/// `poll` returned them, so consuming a single change here always consumes
/// the oldest still-pending one — the one this batch was decoded from.
///
/// # Errors
/// Returns [`ScribeError::PgReplication`] on failure.
pub async fn ack(pool: &PgPool, slot_name: &str) -> Result<()> {
    sqlx::query("SELECT pg_logical_slot_get_changes($1, NULL, 1)")
        .bind(slot_name)
        .execute(pool)
        .await
        .map_err(|e| ScribeError::PgReplication(e.to_string()))?;
    Ok(())
}
