//! Bootstrap configuration loading and resolution
//!
//! Resolution priority for every bootstrap field:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing TOML file is not an error: a warning is logged and the
//! remaining tiers are used.

use crate::db::models::Role;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV: &str = "SREQ_CONFIG";
/// Environment variable overriding the database path
pub const DATABASE_PATH_ENV: &str = "SREQ_DATABASE_PATH";
/// Environment variable overriding the backup directory
pub const BACKUP_DIR_ENV: &str = "SREQ_BACKUP_DIR";
/// Environment variable overriding the HTTP port
pub const PORT_ENV: &str = "SREQ_PORT";

/// Default HTTP port for sreq-admin
pub const DEFAULT_PORT: u16 = 5790;

/// Bootstrap configuration loaded from TOML file
///
/// Every field is optional so a partial file still loads; unset fields fall
/// through to the compiled defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Directory holding backup documents
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Restore behavior
    #[serde(default)]
    pub restore: RestoreConfig,

    /// API tokens
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Restore configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreConfig {
    /// Roll back the whole restore on the first failing record
    #[serde(default)]
    pub abort_on_record_error: bool,
}

/// API token configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
}

/// One configured API token
///
/// Only the SHA-256 hex digest of the token is stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEntry {
    pub sha256: String,
    pub username: String,
    pub role: Role,
}

/// OS-dependent compiled defaults
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub data_folder: PathBuf,
    pub database_path: PathBuf,
    pub backup_dir: PathBuf,
    pub config_file: PathBuf,
    pub port: u16,
    pub log_level: String,
}

impl CompiledDefaults {
    /// Defaults for the platform this binary was built for
    pub fn for_current_platform() -> Self {
        let data_folder = default_data_folder();
        let config_file = dirs::config_dir()
            .map(|d| d.join("sreq").join("sreq-admin.toml"))
            .unwrap_or_else(|| PathBuf::from("sreq-admin.toml"));

        Self {
            database_path: data_folder.join("sreq.db"),
            backup_dir: data_folder.join("backups"),
            data_folder,
            config_file,
            port: DEFAULT_PORT,
            log_level: default_log_level(),
        }
    }
}

/// Get OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/sreq (or /var/lib/sreq for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("sreq"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/sreq"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("sreq"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/sreq"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("sreq"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\sreq"))
    } else {
        PathBuf::from("./sreq_data")
    }
}

/// Load TOML config file
///
/// Missing file → warning + empty config. Unparseable file → `Error::Config`.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file not found: {} (using environment and defaults)",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;

    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    info!("Loaded config file: {}", path.display());
    Ok(config)
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub port: Option<u16>,
}

/// Fully resolved bootstrap configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config_file: PathBuf,
    pub database_path: PathBuf,
    pub backup_dir: PathBuf,
    pub port: u16,
    pub log_level: String,
    pub abort_on_record_error: bool,
    pub tokens: Vec<TokenEntry>,
}

impl ResolvedConfig {
    /// Resolve configuration from CLI → ENV → TOML → defaults
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let defaults = CompiledDefaults::for_current_platform();

        let config_file = overrides
            .config_file
            .clone()
            .or_else(|| env_path(CONFIG_ENV))
            .unwrap_or_else(|| defaults.config_file.clone());

        let toml_config = load_toml_config(&config_file)?;

        Self::from_sources(overrides, config_file, toml_config, defaults)
    }

    /// Resolve from an already-loaded TOML config
    pub fn from_sources(
        overrides: &ConfigOverrides,
        config_file: PathBuf,
        toml_config: TomlConfig,
        defaults: CompiledDefaults,
    ) -> Result<Self> {
        let database_path = overrides
            .database_path
            .clone()
            .or_else(|| env_path(DATABASE_PATH_ENV))
            .or(toml_config.database_path)
            .unwrap_or(defaults.database_path);

        let backup_dir = overrides
            .backup_dir
            .clone()
            .or_else(|| env_path(BACKUP_DIR_ENV))
            .or(toml_config.backup_dir)
            .unwrap_or(defaults.backup_dir);

        let port = match overrides.port {
            Some(port) => port,
            None => match std::env::var(PORT_ENV) {
                Ok(value) => value.parse::<u16>().map_err(|e| {
                    Error::Config(format!("{} is not a valid port ({}): {}", PORT_ENV, value, e))
                })?,
                Err(_) => toml_config.port.unwrap_or(defaults.port),
            },
        };

        Ok(Self {
            config_file,
            database_path,
            backup_dir,
            port,
            log_level: toml_config.logging.level,
            abort_on_record_error: toml_config.restore.abort_on_record_error,
            tokens: toml_config.auth.tokens,
        })
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}
