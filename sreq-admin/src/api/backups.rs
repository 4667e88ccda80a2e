//! Backup administration handlers
//!
//! GET /api/admin/backups, POST /api/admin/backups,
//! POST /api/admin/backups/restore

use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use sreq_common::api::Caller;
use tracing::info;

use crate::api::require_admin;
use crate::backup::{self, BackupDocument, BackupFileInfo, RestoreMode, RestoreOptions, RestoreResult};
use crate::{ApiError, ApiResult, AppState};

/// POST /api/admin/backups/restore request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreRequest {
    pub filename: Option<String>,
    /// "merge" (default) or "replace"
    pub mode: Option<String>,
    #[serde(default)]
    pub clear_existing: bool,
    /// Overrides the configured default when present
    pub abort_on_record_error: Option<bool>,
}

/// GET /api/admin/backups response
#[derive(Debug, Serialize)]
pub struct ListBackupsResponse {
    pub backups: Vec<BackupFileInfo>,
}

/// POST /api/admin/backups response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBackupResponse {
    pub filename: String,
    pub total_records: u64,
}

/// GET /api/admin/backups
pub async fn list_backups(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<ListBackupsResponse>> {
    require_admin(&caller)?;

    let backups = state.backups.list()?;
    Ok(Json(ListBackupsResponse { backups }))
}

/// POST /api/admin/backups
///
/// Exports every collection into a new file in the backup directory.
pub async fn create_backup(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<CreateBackupResponse>> {
    require_admin(&caller)?;

    let document = backup::create_backup(&state.db, &caller.username).await?;
    let filename = state.backups.save(&document)?;

    info!(
        username = %caller.username,
        %filename,
        total_records = document.metadata.total_records,
        "Backup created"
    );

    Ok(Json(CreateBackupResponse {
        filename,
        total_records: document.metadata.total_records,
    }))
}

/// POST /api/admin/backups/restore
///
/// **Request:** `{"filename": "backup-20240901-083000.json", "mode": "merge", "clearExisting": false}`
/// **Response:** restore summary; 200 even when individual records failed
///
/// **Errors:**
/// - 403 Forbidden: caller is not an administrator (checked before file access)
/// - 400 Bad Request: missing/invalid filename, invalid mode, malformed document
/// - 404 Not Found: backup file missing or not valid JSON
/// - 409 Conflict: another restore is running
pub async fn restore_backup(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<RestoreRequest>,
) -> ApiResult<Json<RestoreResult>> {
    require_admin(&caller)?;

    let filename = request
        .filename
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::BadRequest("filename is required".to_string()))?;

    let mode = match request.mode.as_deref() {
        Some(raw) => raw.parse::<RestoreMode>().map_err(ApiError::BadRequest)?,
        None => RestoreMode::default(),
    };

    let options = RestoreOptions {
        mode,
        clear_existing: request.clear_existing,
        abort_on_record_error: request
            .abort_on_record_error
            .unwrap_or(state.abort_on_record_error),
    };

    let _guard = state.restore_gate.try_acquire()?;

    let raw = state.backups.load(filename)?;
    let document = BackupDocument::from_value(raw)?;

    info!(
        username = %caller.username,
        %filename,
        %mode,
        clear_existing = options.clear_existing,
        "Restore requested"
    );

    let result = backup::restore(&state.db, &document, &options).await?;

    Ok(Json(result))
}
