// SPDX-License-Identifier: Apache-2.0
//! TRIGGER-mode capture: an audit table fed by per-table AFTER-ROW triggers,
//! polled on an interval.

use crate::change::{Ack, Batch, RawChange};
use scribe_core::{Operation, Result, ScribeError};
use sqlx::{PgPool, Row};
use std::str::FromStr as _;

const CREATE_AUDIT_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS scribe_audit (
    id BIGSERIAL PRIMARY KEY,
    table_name TEXT NOT NULL,
    operation TEXT NOT NULL CHECK (operation IN ('INSERT', 'UPDATE', 'DELETE')),
    primary_key JSONB NOT NULL,
    old_data JSONB,
    new_data JSONB,
    changed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    processed BOOLEAN NOT NULL DEFAULT false
);
CREATE INDEX IF NOT EXISTS idx_scribe_audit_unprocessed
    ON scribe_audit (id) WHERE NOT processed;
";

/// The trigger function body, grounded on the reference's use of
/// `pg_index`/`pg_attribute` to discover the watched table's primary key
/// columns at fire time, falling back to an `id` column when no primary
/// key is declared.
const CREATE_TRIGGER_FN: &str = r#"
CREATE OR REPLACE FUNCTION scribe_audit_trigger() RETURNS TRIGGER AS $$
DECLARE
    pk_cols TEXT[];
    pk_json JSONB;
    col TEXT;
BEGIN
    SELECT array_agg(a.attname ORDER BY a.attnum) INTO pk_cols
    FROM pg_index i
    JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
    WHERE i.indrelid = TG_RELID AND i.indisprimary;

    IF pk_cols IS NULL THEN
        pk_cols := ARRAY['id'];
    END IF;

    pk_json := '{}'::jsonb;
    FOREACH col IN ARRAY pk_cols LOOP
        IF TG_OP = 'DELETE' THEN
            pk_json := pk_json || jsonb_build_object(col, (to_jsonb(OLD) ->> col));
        ELSE
            pk_json := pk_json || jsonb_build_object(col, (to_jsonb(NEW) ->> col));
        END IF;
    END LOOP;

    INSERT INTO scribe_audit (table_name, operation, primary_key, old_data, new_data)
    VALUES (
        TG_TABLE_NAME,
        TG_OP,
        pk_json,
        CASE WHEN TG_OP IN ('UPDATE', 'DELETE') THEN to_jsonb(OLD) ELSE NULL END,
        CASE WHEN TG_OP IN ('INSERT', 'UPDATE') THEN to_jsonb(NEW) ELSE NULL END
    );
    RETURN NULL;
END;
$$ LANGUAGE plpgsql;
"#;

/// Create the audit table, trigger function, and one AFTER-ROW trigger per
/// watched table. Idempotent: safe to call on every monitor startup.
///
/// # Errors
/// Returns [`ScribeError::PgQuery`] on failure.
pub async fn setup(pool: &PgPool, tables: &[String]) -> Result<()> {
    sqlx::query(CREATE_AUDIT_TABLE)
        .execute(pool)
        .await
        .map_err(|e| ScribeError::PgQuery(e.to_string()))?;
    sqlx::query(CREATE_TRIGGER_FN)
        .execute(pool)
        .await
        .map_err(|e| ScribeError::PgQuery(e.to_string()))?;

    for table in tables {
        let trigger_name = format!("scribe_audit_trg_{table}");
        let drop_sql = format!(r#"DROP TRIGGER IF EXISTS "{trigger_name}" ON "{table}""#);
        let create_sql = format!(
            r#"CREATE TRIGGER "{trigger_name}" AFTER INSERT OR UPDATE OR DELETE ON "{table}"
               FOR EACH ROW EXECUTE FUNCTION scribe_audit_trigger()"#
        );
        sqlx::query(&drop_sql)
            .execute(pool)
            .await
            .map_err(|e| ScribeError::PgQuery(e.to_string()))?;
        sqlx::query(&create_sql)
            .execute(pool)
            .await
            .map_err(|e| ScribeError::PgQuery(e.to_string()))?;
    }
    Ok(())
}

/// Drop every per-table trigger this module installed. Leaves the audit
/// table and its history intact.
///
/// # Errors
/// Returns [`ScribeError::PgQuery`] on failure.
pub async fn cleanup(pool: &PgPool, tables: &[String]) -> Result<()> {
    for table in tables {
        let trigger_name = format!("scribe_audit_trg_{table}");
        let drop_sql = format!(r#"DROP TRIGGER IF EXISTS "{trigger_name}" ON "{table}""#);
        sqlx::query(&drop_sql)
            .execute(pool)
            .await
            .map_err(|e| ScribeError::PgQuery(e.to_string()))?;
    }
    Ok(())
}

/// Fetch up to 100 unprocessed audit rows, ordered oldest-first. TRIGGER
/// mode has no transaction-boundary information to report, so the whole
/// poll cycle comes back as a single [`Batch`] with `xid` unset.
///
/// Rows are left marked unprocessed here — the caller must call [`ack`]
/// only once the batch is durably stored, so a crash in between still finds
/// these rows unprocessed and replays them rather than losing them.
///
/// # Errors
/// Returns [`ScribeError::PgQuery`] on failure.
pub async fn poll(pool: &PgPool) -> Result<Vec<Batch>> {
    let rows = sqlx::query(
        "SELECT id, table_name, operation, primary_key, old_data, new_data FROM scribe_audit \
         WHERE NOT processed ORDER BY id ASC LIMIT 100",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| ScribeError::PgQuery(e.to_string()))?;

    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut changes = Vec::with_capacity(rows.len());
    let mut ids = Vec::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.try_get("id").map_err(|e| ScribeError::PgQuery(e.to_string()))?;
        let table_name: String =
            row.try_get("table_name").map_err(|e| ScribeError::PgQuery(e.to_string()))?;
        let operation: String =
            row.try_get("operation").map_err(|e| ScribeError::PgQuery(e.to_string()))?;
        let primary_key: serde_json::Value =
            row.try_get("primary_key").map_err(|e| ScribeError::PgQuery(e.to_string()))?;
        let old_data: Option<serde_json::Value> =
            row.try_get("old_data").map_err(|e| ScribeError::PgQuery(e.to_string()))?;
        let new_data: Option<serde_json::Value> =
            row.try_get("new_data").map_err(|e| ScribeError::PgQuery(e.to_string()))?;

        ids.push(id);
        changes.push(RawChange {
            table: table_name,
            operation: Operation::from_str(&operation)?,
            primary_key: primary_key.to_string(),
            old_data: old_data.map(|v| v.to_string()),
            new_data: new_data.map(|v| v.to_string()),
        });
    }

    Ok(vec![Batch { xid: None, changes, ack: Ack::Trigger { pool: pool.clone(), ids } }])
}

/// Mark a batch's `scribe_audit` rows processed. Call only after the batch
/// has been durably stored and `HEAD` advanced.
///
/// # Errors
/// Returns [`ScribeError::PgQuery`] on failure.
pub async fn ack(pool: &PgPool, ids: &[i64]) -> Result<()> {
    sqlx::query("UPDATE scribe_audit SET processed = true WHERE id = ANY($1)")
        .bind(ids)
        .execute(pool)
        .await
        .map_err(|e| ScribeError::PgQuery(e.to_string()))?;
    Ok(())
}
