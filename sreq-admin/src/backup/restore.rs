//! Backup restore procedure
//!
//! Replays a backup document into the live schema:
//! 1. Optional clear of all tables, dependents first (failure → warning)
//! 2. One transaction replaying every known collection in dependency order
//! 3. Per-record failures are recorded and processing continues, unless
//!    `abort_on_record_error` is set, in which case the transaction is
//!    rolled back on the first failure
//!
//! The result summary is built fresh per call and returned by value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::{SqliteConnection, SqlitePool, Transaction};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::collections::{convert_field, descriptor, CollectionDescriptor, SqlValue, COLLECTIONS};
use super::document::BackupDocument;
use super::RestoreError;

pub const MESSAGE_SUCCESS: &str = "data restore completed";
pub const MESSAGE_WITH_ERRORS: &str = "data restore completed with errors";
pub const MESSAGE_ABORTED: &str = "data restore aborted: transaction rolled back";

/// How each record is applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreMode {
    /// Upsert keyed by the collection's natural key
    #[default]
    Merge,
    /// Plain insert; fails when the key already exists
    Replace,
}

impl fmt::Display for RestoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreMode::Merge => f.write_str("merge"),
            RestoreMode::Replace => f.write_str("replace"),
        }
    }
}

impl FromStr for RestoreMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "merge" => Ok(RestoreMode::Merge),
            "replace" => Ok(RestoreMode::Replace),
            other => Err(format!(
                "invalid restore mode '{}' (expected 'merge' or 'replace')",
                other
            )),
        }
    }
}

/// Restore options
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    pub mode: RestoreMode,
    /// Delete all existing rows before replaying
    pub clear_existing: bool,
    /// Roll back everything on the first failing record
    pub abort_on_record_error: bool,
}

/// Per-collection outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub name: String,
    pub restored: usize,
    pub failed: usize,
}

/// Aggregated restore details
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreDetails {
    pub tables_processed: usize,
    pub records_restored: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub collections: Vec<CollectionSummary>,
}

/// Restore result returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreResult {
    pub success: bool,
    pub message: String,
    pub details: RestoreDetails,
}

impl RestoreResult {
    fn new() -> Self {
        Self {
            success: true,
            message: MESSAGE_SUCCESS.to_string(),
            details: RestoreDetails::default(),
        }
    }

    fn finalize(&mut self) {
        if !self.details.errors.is_empty() {
            self.success = false;
            self.message = MESSAGE_WITH_ERRORS.to_string();
        }
    }

    fn abort(&mut self) {
        self.success = false;
        self.message = MESSAGE_ABORTED.to_string();
        self.details.tables_processed = 0;
        self.details.records_restored = 0;
        self.details.collections.clear();
    }
}

/// Validate a raw document and restore it
pub async fn restore_value(
    pool: &SqlitePool,
    document: Value,
    options: &RestoreOptions,
) -> Result<RestoreResult, RestoreError> {
    let document = BackupDocument::from_value(document)?;
    restore(pool, &document, options).await
}

/// Restore a validated backup document
///
/// Errors returned here are request-level (transaction could not be opened
/// or committed); record and table failures are reported inside the result.
pub async fn restore(
    pool: &SqlitePool,
    document: &BackupDocument,
    options: &RestoreOptions,
) -> Result<RestoreResult, RestoreError> {
    let restore_id = Uuid::new_v4();
    let mut result = RestoreResult::new();

    info!(
        %restore_id,
        mode = %options.mode,
        clear_existing = options.clear_existing,
        abort_on_record_error = options.abort_on_record_error,
        backup_version = %document.metadata.version,
        backup_creator = %document.metadata.creator,
        backup_timestamp = %document.metadata.timestamp,
        "Starting data restore"
    );

    for name in document.data.keys() {
        if descriptor(name).is_none() {
            warn!(%restore_id, collection = %name, "Skipping unknown collection");
            result
                .details
                .warnings
                .push(format!("skipped unknown collection: {}", name));
        }
    }

    if options.clear_existing {
        match clear_existing(pool).await {
            Ok(deleted) => info!(%restore_id, deleted, "Cleared existing data"),
            Err(e) => {
                warn!(%restore_id, error = %e, "Failed to clear existing data, continuing restore");
                result
                    .details
                    .warnings
                    .push(format!("failed to clear existing data: {}", e));
            }
        }
    }

    let mut tx = pool.begin().await?;

    for collection in COLLECTIONS.iter() {
        let Some(value) = document.data.get(collection.name) else {
            continue;
        };

        let Some(records) = value.as_array() else {
            warn!(%restore_id, collection = collection.name, "Collection is not an array");
            result.details.errors.push(format!(
                "{}: expected an array of records",
                collection.name
            ));
            if options.abort_on_record_error {
                abort_restore(tx, &mut result, restore_id).await;
                return Ok(result);
            }
            continue;
        };

        if records.is_empty() {
            continue;
        }

        let mut summary = CollectionSummary {
            name: collection.name.to_string(),
            restored: 0,
            failed: 0,
        };

        for (index, record) in records.iter().enumerate() {
            match restore_record(&mut *tx, collection, record, options.mode).await {
                Ok(()) => summary.restored += 1,
                Err(message) => {
                    summary.failed += 1;
                    debug!(
                        %restore_id,
                        collection = collection.name,
                        index,
                        error = %message,
                        "Record restore failed"
                    );
                    result
                        .details
                        .errors
                        .push(format!("{}: {}", collection.name, message));

                    if options.abort_on_record_error {
                        warn!(
                            %restore_id,
                            collection = collection.name,
                            index,
                            "Aborting restore on record error"
                        );
                        abort_restore(tx, &mut result, restore_id).await;
                        return Ok(result);
                    }
                }
            }
        }

        info!(
            %restore_id,
            collection = collection.name,
            restored = summary.restored,
            failed = summary.failed,
            "Collection restored"
        );

        result.details.tables_processed += 1;
        result.details.records_restored += summary.restored;
        result.details.collections.push(summary);
    }

    tx.commit().await?;

    result.finalize();

    info!(
        %restore_id,
        success = result.success,
        tables_processed = result.details.tables_processed,
        records_restored = result.details.records_restored,
        errors = result.details.errors.len(),
        warnings = result.details.warnings.len(),
        "Data restore finished"
    );

    Ok(result)
}

/// Roll back the replay and turn the result into the aborted summary
///
/// A failed rollback is reported in `errors`; the connection discards the
/// open transaction when `tx` is dropped either way.
async fn abort_restore(tx: Transaction<'_, Sqlite>, result: &mut RestoreResult, restore_id: Uuid) {
    if let Err(e) = tx.rollback().await {
        warn!(%restore_id, error = %e, "Rollback after record error failed");
        result.details.errors.push(format!("rollback failed: {}", e));
    }
    result.abort();
}

/// Delete all rows, dependents before dependencies
///
/// Runs in its own transaction; on failure nothing is deleted.
pub async fn clear_existing(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut deleted = 0;

    for collection in COLLECTIONS.iter().rev() {
        let sql = format!("DELETE FROM {}", quote_ident(collection.table));
        let rows = sqlx::query(&sql).execute(&mut *tx).await?.rows_affected();
        debug!(table = collection.table, rows, "Cleared table");
        deleted += rows;
    }

    tx.commit().await?;
    Ok(deleted)
}

/// Apply one record; the error string becomes the `errors` entry body
async fn restore_record(
    conn: &mut SqliteConnection,
    collection: &CollectionDescriptor,
    record: &Value,
    mode: RestoreMode,
) -> Result<(), String> {
    let Value::Object(fields) = record else {
        return Err("record is not an object".to_string());
    };

    let columns = map_fields(collection, fields)?;
    let label = record_label(collection, fields);

    // A NULL key never matches ON CONFLICT, so it would insert a new row on every replay
    let has_key = columns
        .iter()
        .any(|(c, v)| *c == collection.natural_key && *v != SqlValue::Null);

    if mode == RestoreMode::Merge && !has_key {
        return Err(format!(
            "{}: missing natural key '{}'",
            label,
            collection.key_field().map(|f| f.key).unwrap_or(collection.natural_key)
        ));
    }

    let sql = build_statement(collection, &columns, mode);

    let mut query = sqlx::query::<Sqlite>(&sql);
    for (_, value) in columns {
        query = bind_value(query, value);
    }

    query
        .execute(conn)
        .await
        .map(|_| ())
        .map_err(|e| format!("{}: {}", label, db_error_message(&e)))
}

/// Convert present record fields into (column, value) pairs
///
/// Absent fields are left out so the column keeps its default (insert) or
/// its current value (merge).
fn map_fields(
    collection: &CollectionDescriptor,
    fields: &Map<String, Value>,
) -> Result<Vec<(&'static str, SqlValue)>, String> {
    let mut columns = Vec::with_capacity(collection.fields.len());

    for spec in collection.fields {
        if let Some(value) = fields.get(spec.key) {
            columns.push((spec.column, convert_field(spec, value)?));
        }
    }

    if columns.is_empty() {
        return Err("record has no recognized fields".to_string());
    }

    Ok(columns)
}

/// INSERT or upsert statement for the given columns
fn build_statement(
    collection: &CollectionDescriptor,
    columns: &[(&'static str, SqlValue)],
    mode: RestoreMode,
) -> String {
    let names: Vec<String> = columns.iter().map(|(c, _)| quote_ident(c)).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(collection.table),
        names.join(", "),
        placeholders
    );

    if mode == RestoreMode::Merge {
        // Never rewrite the key or the row id of an existing row
        let updates: Vec<String> = columns
            .iter()
            .map(|(c, _)| *c)
            .filter(|c| *c != collection.natural_key && *c != "id")
            .map(|c| format!("{0} = excluded.{0}", quote_ident(c)))
            .collect();

        if updates.is_empty() {
            sql.push_str(&format!(
                " ON CONFLICT({}) DO NOTHING",
                quote_ident(collection.natural_key)
            ));
        } else {
            sql.push_str(&format!(
                " ON CONFLICT({}) DO UPDATE SET {}",
                quote_ident(collection.natural_key),
                updates.join(", ")
            ));
        }
    }

    sql
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: SqlValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Integer(v) => query.bind(v),
        SqlValue::Text(v) => query.bind(v),
        SqlValue::Timestamp(v) => query.bind(v),
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Short record identification for error messages
fn record_label(collection: &CollectionDescriptor, fields: &Map<String, Value>) -> String {
    let key = collection
        .key_field()
        .map(|f| f.key)
        .unwrap_or(collection.natural_key);

    match fields.get(key) {
        Some(Value::String(s)) => format!("record {}={}", key, s),
        Some(Value::Null) | None => "record without key".to_string(),
        Some(other) => format!("record {}={}", key, other),
    }
}

fn db_error_message(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => db_err.message().to_string(),
        other => other.to_string(),
    }
}
