//! sreq-admin library - backup administration service
//!
//! Admin-only HTTP surface for the song-request database: create, list
//! and restore JSON backups, plus deployment verification.

use axum::Router;
use sqlx::SqlitePool;
use sreq_common::api::TokenRegistry;
use std::sync::Arc;

pub mod api;
pub mod backup;
pub mod error;
pub mod verify;

pub use crate::error::{ApiError, ApiResult};

use crate::backup::{BackupStore, RestoreGate};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Backup directory
    pub backups: BackupStore,
    /// Configured API tokens
    pub tokens: Arc<TokenRegistry>,
    /// Rejects overlapping restores, including ones from other processes
    pub restore_gate: RestoreGate,
    /// Default for requests that do not set `abortOnRecordError`
    pub abort_on_record_error: bool,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, backups: BackupStore, tokens: TokenRegistry) -> Self {
        let restore_gate = RestoreGate::for_backup_dir(backups.dir());
        Self {
            db,
            backups,
            tokens: Arc::new(tokens),
            restore_gate,
            abort_on_record_error: false,
        }
    }

    pub fn with_abort_on_record_error(mut self, abort: bool) -> Self {
        self.abort_on_record_error = abort;
        self
    }
}

/// Build application router
///
/// Health endpoint is public; everything under /api/admin requires a token.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};
    use tower_http::trace::TraceLayer;

    // Protected routes (require authentication)
    let protected = Router::new()
        .route(
            "/api/admin/backups",
            get(api::list_backups).post(api::create_backup),
        )
        .route("/api/admin/backups/restore", post(api::restore_backup))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    // Public routes (no authentication)
    let public = Router::new()
        .merge(api::health_routes())
        .route("/api/buildinfo", get(api::get_build_info));

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
