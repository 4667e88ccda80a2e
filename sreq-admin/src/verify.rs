//! Deployment verification
//!
//! Sequential checks run by `sreq-admin verify` before a service is put in
//! front of users: configuration, environment, backup directory, database
//! reachability and schema, build identification.

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sreq_common::api::TokenRegistry;
use sreq_common::config::{ResolvedConfig, BACKUP_DIR_ENV, CONFIG_ENV, DATABASE_PATH_ENV, PORT_ENV};
use sreq_common::db::missing_tables;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::api::BuildInfo;

/// Outcome of one check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Pass => f.write_str("PASS"),
            CheckStatus::Warn => f.write_str("WARN"),
            CheckStatus::Fail => f.write_str("FAIL"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            detail: detail.into(),
        }
    }
}

/// All check results in execution order
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub checks: Vec<CheckResult>,
}

impl VerifyReport {
    /// True when no check failed (warnings allowed)
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.status != CheckStatus::Fail)
    }

    pub fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            writeln!(f, "[{}] {}: {}", check.status, check.name, check.detail)?;
        }
        write!(
            f,
            "{} passed, {} warnings, {} failed",
            self.count(CheckStatus::Pass),
            self.count(CheckStatus::Warn),
            self.count(CheckStatus::Fail)
        )
    }
}

/// Run every deployment check
pub async fn run_checks(config: &ResolvedConfig) -> VerifyReport {
    let mut report = VerifyReport::default();

    report.checks.push(check_build_info());
    report.checks.push(check_config_file(&config.config_file));
    report.checks.push(check_tokens(config));
    report.checks.extend(check_environment());
    report.checks.push(check_backup_dir(&config.backup_dir));
    report.checks.extend(check_database(&config.database_path).await);

    report
}

fn check_build_info() -> CheckResult {
    let info = BuildInfo::current();
    CheckResult::new(
        "build",
        CheckStatus::Pass,
        format!(
            "v{} [{}] built {} ({})",
            info.version, info.git_hash, info.build_timestamp, info.build_profile
        ),
    )
}

fn check_config_file(path: &Path) -> CheckResult {
    if path.exists() {
        CheckResult::new("config file", CheckStatus::Pass, path.display().to_string())
    } else {
        CheckResult::new(
            "config file",
            CheckStatus::Warn,
            format!("{} not found, using environment and defaults", path.display()),
        )
    }
}

fn check_tokens(config: &ResolvedConfig) -> CheckResult {
    match TokenRegistry::from_entries(&config.tokens) {
        Err(e) => CheckResult::new("api tokens", CheckStatus::Fail, e.to_string()),
        Ok(registry) if registry.has_admin() => CheckResult::new(
            "api tokens",
            CheckStatus::Pass,
            format!("{} token(s) configured", registry.len()),
        ),
        Ok(_) => CheckResult::new(
            "api tokens",
            CheckStatus::Fail,
            "no token with the admin role is configured",
        ),
    }
}

fn check_environment() -> Vec<CheckResult> {
    [CONFIG_ENV, DATABASE_PATH_ENV, BACKUP_DIR_ENV, PORT_ENV]
        .iter()
        .map(|name| match std::env::var(name) {
            Ok(value) => CheckResult::new(name, CheckStatus::Pass, format!("set to {}", value)),
            Err(_) => CheckResult::new(name, CheckStatus::Pass, "not set"),
        })
        .collect()
}

fn check_backup_dir(dir: &Path) -> CheckResult {
    if let Err(e) = std::fs::create_dir_all(dir) {
        return CheckResult::new(
            "backup directory",
            CheckStatus::Fail,
            format!("cannot create {}: {}", dir.display(), e),
        );
    }

    let scratch = dir.join(".sreq-write-check");
    match std::fs::write(&scratch, b"ok") {
        Ok(()) => {
            let _ = std::fs::remove_file(&scratch);
            CheckResult::new("backup directory", CheckStatus::Pass, dir.display().to_string())
        }
        Err(e) => CheckResult::new(
            "backup directory",
            CheckStatus::Fail,
            format!("{} is not writable: {}", dir.display(), e),
        ),
    }
}

/// Connect without creating the file and inspect the schema
async fn check_database(db_path: &Path) -> Vec<CheckResult> {
    if !db_path.exists() {
        return vec![CheckResult::new(
            "database",
            CheckStatus::Fail,
            format!("{} does not exist", db_path.display()),
        )];
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(false);

    let pool = match SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            return vec![CheckResult::new(
                "database",
                CheckStatus::Fail,
                format!("cannot connect to {}: {}", db_path.display(), e),
            )]
        }
    };

    let mut results = Vec::new();

    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&pool).await {
        Ok(_) => results.push(CheckResult::new(
            "database",
            CheckStatus::Pass,
            format!("reachable at {}", db_path.display()),
        )),
        Err(e) => {
            results.push(CheckResult::new(
                "database",
                CheckStatus::Fail,
                format!("query failed: {}", e),
            ));
            return results;
        }
    }

    match missing_tables(&pool).await {
        Ok(missing) if missing.is_empty() => results.push(CheckResult::new(
            "schema",
            CheckStatus::Pass,
            "all tables present",
        )),
        Ok(missing) => results.push(CheckResult::new(
            "schema",
            CheckStatus::Fail,
            format!("missing tables: {}", missing.join(", ")),
        )),
        Err(e) => results.push(CheckResult::new(
            "schema",
            CheckStatus::Fail,
            format!("schema inspection failed: {}", e),
        )),
    }

    pool.close().await;
    debug!("Database verification finished");

    results
}
