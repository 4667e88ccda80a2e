//! Collection descriptors for backup documents
//!
//! Each backup collection maps to one table through a static descriptor:
//! natural key, JSON key → column mapping and the kind of every field. The
//! descriptor array is ordered so every referenced table comes before the
//! tables that reference it.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

/// How a record field is converted before it reaches the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Text,
    /// JSON boolean (or 0/1) stored as INTEGER
    Bool,
    /// Serialized timestamp stored as the store's temporal type
    Date,
    /// Account role, normalized to its canonical name
    Role,
}

/// One record field
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// camelCase key inside the backup record
    pub key: &'static str,
    /// snake_case table column
    pub column: &'static str,
    pub kind: FieldKind,
}

const fn field(key: &'static str, column: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { key, column, kind }
}

/// Restore rule for one collection
#[derive(Debug)]
pub struct CollectionDescriptor {
    /// Collection name inside the backup document
    pub name: &'static str,
    pub table: &'static str,
    /// Column the merge upsert is keyed on
    pub natural_key: &'static str,
    pub fields: &'static [FieldSpec],
}

impl CollectionDescriptor {
    /// Field spec of the natural key column
    pub fn key_field(&self) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.column == self.natural_key)
    }
}

use FieldKind::*;

const SYSTEM_SETTINGS_FIELDS: &[FieldSpec] = &[
    field("id", "id", Integer),
    field("siteTitle", "site_title", Text),
    field("siteDescription", "site_description", Text),
    field("submissionGuidelines", "submission_guidelines", Text),
    field("icpBeian", "icp_beian", Text),
    field("enablePlayTimeSelection", "enable_play_time_selection", Bool),
    field("enableRequestTimeLimitation", "enable_request_time_limitation", Bool),
    field("forceBlockAllRequests", "force_block_all_requests", Bool),
    field("createdAt", "created_at", Date),
    field("updatedAt", "updated_at", Date),
];

const PLAY_TIMES_FIELDS: &[FieldSpec] = &[
    field("id", "id", Integer),
    field("name", "name", Text),
    field("startTime", "start_time", Text),
    field("endTime", "end_time", Text),
    field("enabled", "enabled", Bool),
    field("description", "description", Text),
    field("createdAt", "created_at", Date),
    field("updatedAt", "updated_at", Date),
];

const SEMESTERS_FIELDS: &[FieldSpec] = &[
    field("id", "id", Integer),
    field("name", "name", Text),
    field("isActive", "is_active", Bool),
    field("createdAt", "created_at", Date),
    field("updatedAt", "updated_at", Date),
];

const USERS_FIELDS: &[FieldSpec] = &[
    field("id", "id", Integer),
    field("username", "username", Text),
    field("name", "name", Text),
    field("grade", "grade", Text),
    field("class", "class", Text),
    field("role", "role", Role),
    field("password", "password_hash", Text),
    field("lastLogin", "last_login", Date),
    field("lastLoginIp", "last_login_ip", Text),
    field("forcePasswordChange", "force_password_change", Bool),
    field("createdAt", "created_at", Date),
    field("updatedAt", "updated_at", Date),
];

const SONGS_FIELDS: &[FieldSpec] = &[
    field("id", "id", Integer),
    field("title", "title", Text),
    field("artist", "artist", Text),
    field("requestedById", "requested_by", Integer),
    field("played", "played", Bool),
    field("playedAt", "played_at", Date),
    field("semester", "semester", Text),
    field("preferredPlayTimeId", "preferred_play_time_id", Integer),
    field("cover", "cover_image", Text),
    field("musicPlatform", "music_platform", Text),
    field("musicId", "music_id", Text),
    field("createdAt", "created_at", Date),
    field("updatedAt", "updated_at", Date),
];

const VOTES_FIELDS: &[FieldSpec] = &[
    field("id", "id", Integer),
    field("songId", "song_id", Integer),
    field("userId", "user_id", Integer),
    field("createdAt", "created_at", Date),
];

const SCHEDULES_FIELDS: &[FieldSpec] = &[
    field("id", "id", Integer),
    field("songId", "song_id", Integer),
    field("playDate", "play_date", Date),
    field("sequence", "sequence", Integer),
    field("played", "played", Bool),
    field("playTimeId", "play_time_id", Integer),
    field("createdAt", "created_at", Date),
    field("updatedAt", "updated_at", Date),
];

const NOTIFICATION_SETTINGS_FIELDS: &[FieldSpec] = &[
    field("id", "id", Integer),
    field("userId", "user_id", Integer),
    field("enabled", "enabled", Bool),
    field("songRequestEnabled", "song_request_enabled", Bool),
    field("songVotedEnabled", "song_voted_enabled", Bool),
    field("songPlayedEnabled", "song_played_enabled", Bool),
    field("refreshInterval", "refresh_interval", Integer),
    field("songVotedThreshold", "song_voted_threshold", Integer),
    field("createdAt", "created_at", Date),
    field("updatedAt", "updated_at", Date),
];

const NOTIFICATIONS_FIELDS: &[FieldSpec] = &[
    field("id", "id", Integer),
    field("userId", "user_id", Integer),
    field("type", "type", Text),
    field("message", "message", Text),
    field("read", "read", Bool),
    field("songId", "song_id", Integer),
    field("createdAt", "created_at", Date),
    field("updatedAt", "updated_at", Date),
];

/// All restorable collections in dependency order
pub static COLLECTIONS: [CollectionDescriptor; 9] = [
    CollectionDescriptor {
        name: "systemSettings",
        table: "system_settings",
        natural_key: "id",
        fields: SYSTEM_SETTINGS_FIELDS,
    },
    CollectionDescriptor {
        name: "playTimes",
        table: "play_times",
        natural_key: "id",
        fields: PLAY_TIMES_FIELDS,
    },
    CollectionDescriptor {
        name: "semesters",
        table: "semesters",
        natural_key: "name",
        fields: SEMESTERS_FIELDS,
    },
    CollectionDescriptor {
        name: "users",
        table: "users",
        natural_key: "username",
        fields: USERS_FIELDS,
    },
    CollectionDescriptor {
        name: "songs",
        table: "songs",
        natural_key: "id",
        fields: SONGS_FIELDS,
    },
    CollectionDescriptor {
        name: "votes",
        table: "votes",
        natural_key: "id",
        fields: VOTES_FIELDS,
    },
    CollectionDescriptor {
        name: "schedules",
        table: "schedules",
        natural_key: "id",
        fields: SCHEDULES_FIELDS,
    },
    CollectionDescriptor {
        name: "notificationSettings",
        table: "notification_settings",
        natural_key: "id",
        fields: NOTIFICATION_SETTINGS_FIELDS,
    },
    CollectionDescriptor {
        name: "notifications",
        table: "notifications",
        natural_key: "id",
        fields: NOTIFICATIONS_FIELDS,
    },
];

/// Look up the descriptor for a collection name
pub fn descriptor(name: &str) -> Option<&'static CollectionDescriptor> {
    COLLECTIONS.iter().find(|d| d.name == name)
}

/// Converted field value ready to bind
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

/// Convert one JSON field value according to its kind
///
/// `null` always converts to NULL; empty strings convert to NULL for dates.
pub fn convert_field(spec: &FieldSpec, value: &Value) -> Result<SqlValue, String> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    let invalid = || format!("invalid value for '{}': {}", spec.key, value);

    match spec.kind {
        FieldKind::Integer => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| is_whole_i64(*f)).map(|f| f as i64))
                .map(SqlValue::Integer)
                .ok_or_else(invalid),
            Value::String(s) => s.trim().parse::<i64>().map(SqlValue::Integer).map_err(|_| invalid()),
            _ => Err(invalid()),
        },
        FieldKind::Text => match value {
            Value::String(s) => Ok(SqlValue::Text(s.clone())),
            Value::Number(n) => Ok(SqlValue::Text(n.to_string())),
            Value::Bool(b) => Ok(SqlValue::Text(b.to_string())),
            _ => Err(invalid()),
        },
        FieldKind::Bool => match value {
            Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(SqlValue::Integer(0)),
                Some(1) => Ok(SqlValue::Integer(1)),
                _ => Err(invalid()),
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(SqlValue::Integer(1)),
                "false" | "0" => Ok(SqlValue::Integer(0)),
                _ => Err(invalid()),
            },
            _ => Err(invalid()),
        },
        FieldKind::Date => match value {
            Value::String(s) if s.trim().is_empty() => Ok(SqlValue::Null),
            Value::String(s) => parse_timestamp(s)
                .map(SqlValue::Timestamp)
                .ok_or_else(invalid),
            // Epoch milliseconds
            Value::Number(n) => n
                .as_i64()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .map(SqlValue::Timestamp)
                .ok_or_else(invalid),
            _ => Err(invalid()),
        },
        FieldKind::Role => match value {
            Value::String(s) => s
                .parse::<sreq_common::db::Role>()
                .map(|role| SqlValue::Text(role.as_str().to_string()))
                .map_err(|e| format!("invalid value for '{}': {}", spec.key, e)),
            _ => Err(invalid()),
        },
    }
}

/// Whole float that fits in i64 without saturating
///
/// `i64::MAX as f64` rounds up to 2^63, so the upper bound is exclusive.
fn is_whole_i64(f: f64) -> bool {
    f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}

/// Parse a serialized timestamp
///
/// Accepts RFC 3339, SQLite's `YYYY-MM-DD HH:MM:SS[.fff]` (taken as UTC) and
/// bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    // sqlx writes DateTime<Utc> with an offset after a space separator
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Canonical serialized form used in exported documents
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sreq_common::db::TABLES_IN_DEPENDENCY_ORDER;

    fn spec(kind: FieldKind) -> FieldSpec {
        field("value", "value", kind)
    }

    #[test]
    fn test_collections_follow_table_dependency_order() {
        let tables: Vec<&str> = COLLECTIONS.iter().map(|d| d.table).collect();
        assert_eq!(tables, TABLES_IN_DEPENDENCY_ORDER.to_vec());
    }

    #[test]
    fn test_every_natural_key_is_a_field() {
        for d in COLLECTIONS.iter() {
            assert!(d.key_field().is_some(), "{} has no key field", d.name);
        }
    }

    #[test]
    fn test_natural_keys() {
        assert_eq!(descriptor("users").unwrap().natural_key, "username");
        assert_eq!(descriptor("semesters").unwrap().natural_key, "name");
        assert_eq!(descriptor("songs").unwrap().natural_key, "id");
        assert_eq!(descriptor("playTimes").unwrap().natural_key, "id");
        assert_eq!(descriptor("systemSettings").unwrap().natural_key, "id");
        assert!(descriptor("foo").is_none());
    }

    #[test]
    fn test_date_conversion() {
        let date = spec(FieldKind::Date);

        let converted = convert_field(&date, &json!("2024-09-01T08:30:00.000Z")).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 9, 1, 8, 30, 0).unwrap();
        assert_eq!(converted, SqlValue::Timestamp(expected));

        let converted = convert_field(&date, &json!("2024-09-01T10:30:00+02:00")).unwrap();
        assert_eq!(converted, SqlValue::Timestamp(expected));

        let converted = convert_field(&date, &json!("2024-09-01 08:30:00")).unwrap();
        assert_eq!(converted, SqlValue::Timestamp(expected));

        assert_eq!(convert_field(&date, &json!("")).unwrap(), SqlValue::Null);
        assert_eq!(convert_field(&date, &Value::Null).unwrap(), SqlValue::Null);
        assert!(convert_field(&date, &json!("yesterday")).is_err());
    }

    #[test]
    fn test_bare_date_is_midnight_utc() {
        let converted = convert_field(&spec(FieldKind::Date), &json!("2024-09-01")).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();
        assert_eq!(converted, SqlValue::Timestamp(expected));
    }

    #[test]
    fn test_bool_conversion() {
        let b = spec(FieldKind::Bool);
        assert_eq!(convert_field(&b, &json!(true)).unwrap(), SqlValue::Integer(1));
        assert_eq!(convert_field(&b, &json!(0)).unwrap(), SqlValue::Integer(0));
        assert_eq!(convert_field(&b, &json!("false")).unwrap(), SqlValue::Integer(0));
        assert!(convert_field(&b, &json!(7)).is_err());
    }

    #[test]
    fn test_integer_conversion() {
        let i = spec(FieldKind::Integer);
        assert_eq!(convert_field(&i, &json!(42)).unwrap(), SqlValue::Integer(42));
        assert_eq!(convert_field(&i, &json!("42")).unwrap(), SqlValue::Integer(42));
        assert_eq!(convert_field(&i, &json!(7.0)).unwrap(), SqlValue::Integer(7));
        assert!(convert_field(&i, &json!(4.5)).is_err());
        assert!(convert_field(&i, &json!(1e20)).is_err());
        assert!(convert_field(&i, &json!(-1e20)).is_err());
        assert!(convert_field(&i, &json!(9.223372036854775807e18)).is_err());
        assert!(convert_field(&i, &json!({"nested": 1})).is_err());
    }

    #[test]
    fn test_role_is_normalized() {
        let r = spec(FieldKind::Role);
        assert_eq!(
            convert_field(&r, &json!("ADMIN")).unwrap(),
            SqlValue::Text("admin".to_string())
        );
        assert!(convert_field(&r, &json!("superuser")).is_err());
    }

    #[test]
    fn test_format_timestamp_round_trips() {
        let dt = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 1).unwrap();
        let formatted = format_timestamp(&dt);
        assert_eq!(formatted, "2024-02-29T23:59:01.000Z");
        assert_eq!(parse_timestamp(&formatted), Some(dt));
    }
}
