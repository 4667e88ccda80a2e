//! Backup document model
//!
//! ```json
//! {
//!   "metadata": { "version": "1.0", "timestamp": "...", "creator": "admin", "totalRecords": 42 },
//!   "data": { "users": [ { ... } ], "songs": [ ... ] }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::RestoreError;

/// Current backup document format version
pub const BACKUP_FORMAT_VERSION: &str = "1.0";

/// Backup metadata block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub total_records: u64,
}

impl BackupMetadata {
    /// Read metadata without rejecting unexpected field types
    ///
    /// Metadata is informational only. A value of the wrong type falls back
    /// to its JSON text, or to 0 for the record count.
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        let text = |key: &str| match fields.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        let total_records = match fields.get("totalRecords") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };

        Self {
            version: text("version"),
            timestamp: text("timestamp"),
            creator: text("creator"),
            total_records,
        }
    }
}

/// Parsed backup document
///
/// `data` keeps collection order as written; processing order never depends
/// on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupDocument {
    pub metadata: BackupMetadata,
    pub data: Map<String, Value>,
}

impl BackupDocument {
    /// Validate and convert a raw JSON value
    ///
    /// Fails with `RestoreError::Malformed` when `metadata` or `data` is
    /// absent, or when either has the wrong shape.
    pub fn from_value(value: Value) -> Result<Self, RestoreError> {
        let Value::Object(mut root) = value else {
            return Err(RestoreError::Malformed(
                "backup document must be a JSON object".to_string(),
            ));
        };

        let metadata = match root.remove("metadata") {
            None | Some(Value::Null) => {
                return Err(RestoreError::Malformed(
                    "backup document is missing 'metadata'".to_string(),
                ))
            }
            Some(Value::Object(fields)) => BackupMetadata::from_fields(&fields),
            Some(_) => {
                return Err(RestoreError::Malformed(
                    "'metadata' must be an object".to_string(),
                ))
            }
        };

        let data = match root.remove("data") {
            None | Some(Value::Null) => {
                return Err(RestoreError::Malformed(
                    "backup document is missing 'data'".to_string(),
                ))
            }
            Some(Value::Object(data)) => data,
            Some(_) => {
                return Err(RestoreError::Malformed(
                    "'data' must be an object of collections".to_string(),
                ))
            }
        };

        Ok(Self { metadata, data })
    }

    /// Number of records across all array-valued collections
    pub fn record_count(&self) -> u64 {
        self.data
            .values()
            .filter_map(Value::as_array)
            .map(|records| records.len() as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_document() {
        let doc = BackupDocument::from_value(json!({
            "metadata": {
                "version": "1.0",
                "timestamp": "2024-09-01T00:00:00.000Z",
                "creator": "admin",
                "totalRecords": 1
            },
            "data": { "semesters": [ { "name": "Fall", "isActive": true } ] }
        }))
        .unwrap();

        assert_eq!(doc.metadata.creator, "admin");
        assert_eq!(doc.metadata.total_records, 1);
        assert_eq!(doc.record_count(), 1);
    }

    #[test]
    fn test_missing_metadata_is_malformed() {
        let err = BackupDocument::from_value(json!({ "data": {} })).unwrap_err();
        assert!(matches!(err, RestoreError::Malformed(msg) if msg.contains("metadata")));
    }

    #[test]
    fn test_missing_data_is_malformed() {
        let err = BackupDocument::from_value(json!({ "metadata": {} })).unwrap_err();
        assert!(matches!(err, RestoreError::Malformed(msg) if msg.contains("data")));
    }

    #[test]
    fn test_non_object_root_is_malformed() {
        assert!(BackupDocument::from_value(json!([1, 2, 3])).is_err());
        assert!(BackupDocument::from_value(json!({ "metadata": {}, "data": [] })).is_err());
    }

    #[test]
    fn test_mistyped_metadata_fields_accepted() {
        let doc = BackupDocument::from_value(json!({
            "metadata": {
                "version": 1,
                "timestamp": 1725179400000u64,
                "creator": null,
                "totalRecords": "12"
            },
            "data": {}
        }))
        .unwrap();

        assert_eq!(doc.metadata.version, "1");
        assert_eq!(doc.metadata.timestamp, "1725179400000");
        assert_eq!(doc.metadata.creator, "");
        assert_eq!(doc.metadata.total_records, 12);

        let doc = BackupDocument::from_value(json!({
            "metadata": { "totalRecords": -3 },
            "data": {}
        }))
        .unwrap();
        assert_eq!(doc.metadata.total_records, 0);
    }

    #[test]
    fn test_non_object_metadata_is_malformed() {
        for metadata in [json!("1.0"), json!([]), json!(42)] {
            let err = BackupDocument::from_value(json!({ "metadata": metadata, "data": {} }))
                .unwrap_err();
            assert!(matches!(err, RestoreError::Malformed(msg) if msg.contains("metadata")));
        }
    }

    #[test]
    fn test_sparse_metadata_accepted() {
        let doc = BackupDocument::from_value(json!({ "metadata": {}, "data": {} })).unwrap();
        assert_eq!(doc.metadata, BackupMetadata::default());
    }

    #[test]
    fn test_serializes_camel_case_metadata() {
        let doc = BackupDocument {
            metadata: BackupMetadata {
                version: BACKUP_FORMAT_VERSION.to_string(),
                timestamp: "t".to_string(),
                creator: "c".to_string(),
                total_records: 3,
            },
            data: Map::new(),
        };

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["metadata"]["totalRecords"], 3);
    }
}
