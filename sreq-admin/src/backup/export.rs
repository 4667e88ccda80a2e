//! Backup export
//!
//! Reads every known table in dependency order and produces a backup
//! document that [`restore`](super::restore::restore) accepts unchanged.

use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::info;

use super::collections::{format_timestamp, parse_timestamp, FieldKind, FieldSpec, COLLECTIONS};
use super::document::{BackupDocument, BackupMetadata, BACKUP_FORMAT_VERSION};

/// Export all collections into a backup document
pub async fn create_backup(pool: &SqlitePool, creator: &str) -> Result<BackupDocument, sqlx::Error> {
    let mut data = Map::new();

    for collection in COLLECTIONS.iter() {
        let columns: Vec<String> = collection
            .fields
            .iter()
            .map(|f| format!("\"{}\"", f.column))
            .collect();

        let sql = format!(
            "SELECT {} FROM \"{}\" ORDER BY \"id\"",
            columns.join(", "),
            collection.table
        );

        let rows = sqlx::query(&sql).fetch_all(pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = Map::new();
            for spec in collection.fields {
                record.insert(spec.key.to_string(), read_field(row, spec)?);
            }
            records.push(Value::Object(record));
        }

        data.insert(collection.name.to_string(), Value::Array(records));
    }

    let mut document = BackupDocument {
        metadata: BackupMetadata {
            version: BACKUP_FORMAT_VERSION.to_string(),
            timestamp: format_timestamp(&Utc::now()),
            creator: creator.to_string(),
            total_records: 0,
        },
        data,
    };
    document.metadata.total_records = document.record_count();

    info!(
        creator,
        total_records = document.metadata.total_records,
        "Backup document created"
    );

    Ok(document)
}

/// Read one column back into its backup JSON form
fn read_field(row: &SqliteRow, spec: &FieldSpec) -> Result<Value, sqlx::Error> {
    let value = match spec.kind {
        FieldKind::Integer => row
            .try_get::<Option<i64>, _>(spec.column)?
            .map(Value::from)
            .unwrap_or(Value::Null),
        FieldKind::Bool => row
            .try_get::<Option<i64>, _>(spec.column)?
            .map(|v| Value::Bool(v != 0))
            .unwrap_or(Value::Null),
        FieldKind::Text | FieldKind::Role => row
            .try_get::<Option<String>, _>(spec.column)?
            .map(Value::String)
            .unwrap_or(Value::Null),
        // Column defaults use SQLite's format; normalize to RFC 3339
        FieldKind::Date => row
            .try_get::<Option<String>, _>(spec.column)?
            .map(|raw| match parse_timestamp(&raw) {
                Some(dt) => Value::String(format_timestamp(&dt)),
                None => Value::String(raw),
            })
            .unwrap_or(Value::Null),
    };

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sreq_common::db::init_memory_database;

    #[tokio::test]
    async fn test_empty_database_exports_every_collection() {
        let pool = init_memory_database().await.unwrap();

        let document = create_backup(&pool, "alice").await.unwrap();

        assert_eq!(document.metadata.creator, "alice");
        assert_eq!(document.metadata.version, BACKUP_FORMAT_VERSION);
        assert_eq!(document.metadata.total_records, 0);
        assert_eq!(document.data.len(), COLLECTIONS.len());
        for collection in COLLECTIONS.iter() {
            assert_eq!(document.data[collection.name], Value::Array(vec![]));
        }
    }

    #[tokio::test]
    async fn test_exported_fields_use_backup_keys() {
        let pool = init_memory_database().await.unwrap();
        sqlx::query(
            "INSERT INTO users (id, username, role, force_password_change, created_at) \
             VALUES (1, 'alice', 'admin', 1, '2024-09-01 08:30:00')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let document = create_backup(&pool, "op").await.unwrap();
        let user = &document.data["users"][0];

        assert_eq!(user["username"], "alice");
        assert_eq!(user["forcePasswordChange"], true);
        assert_eq!(user["createdAt"], "2024-09-01T08:30:00.000Z");
        assert_eq!(user["lastLogin"], Value::Null);
        assert_eq!(document.metadata.total_records, 1);
    }
}
