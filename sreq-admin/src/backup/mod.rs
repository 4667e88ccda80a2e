//! Backup documents: restore, export and on-disk storage

pub mod collections;
pub mod document;
pub mod export;
pub mod gate;
pub mod restore;
pub mod store;

pub use collections::{descriptor, CollectionDescriptor, COLLECTIONS};
pub use document::{BackupDocument, BackupMetadata, BACKUP_FORMAT_VERSION};
pub use export::create_backup;
pub use gate::{GateError, RestoreGate, RestoreGuard, RESTORE_LOCK_FILE};
pub use restore::{
    clear_existing, restore, restore_value, CollectionSummary, RestoreDetails, RestoreMode,
    RestoreOptions, RestoreResult,
};
pub use store::{BackupFileInfo, BackupStore, BackupStoreError};

use thiserror::Error;

/// Request-level restore failures
///
/// Record and collection failures never surface here; they are collected
/// in [`RestoreResult`].
#[derive(Debug, Error)]
pub enum RestoreError {
    /// Document lacks `metadata` or `data`, or has the wrong shape
    #[error("Malformed backup: {0}")]
    Malformed(String),

    /// Transaction could not be opened, committed or rolled back
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
