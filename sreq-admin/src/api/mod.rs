//! HTTP API handlers for sreq-admin

pub mod auth;
pub mod backups;
pub mod buildinfo;
pub mod health;

pub use auth::{auth_middleware, require_admin};
pub use backups::{create_backup, list_backups, restore_backup};
pub use buildinfo::{get_build_info, BuildInfo};
pub use health::health_routes;
