//! sreq-admin - Main entry point
//!
//! Backup administration for the song-request service: serves the admin
//! HTTP API, and runs backup, restore and deployment verification from the
//! command line.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sreq_admin::backup::{self, BackupDocument, BackupStore, RestoreGate, RestoreMode, RestoreOptions};
use sreq_admin::{build_router, verify, AppState};
use sreq_common::api::{Caller, TokenRegistry};
use sreq_common::config::{ConfigOverrides, ResolvedConfig};
use sreq_common::db::init_database;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for sreq-admin
#[derive(Parser, Debug)]
#[command(name = "sreq-admin")]
#[command(about = "Backup administration for the song-request service")]
#[command(version)]
struct Cli {
    /// Bootstrap config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides SREQ_DATABASE_PATH and config)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Backup directory (overrides SREQ_BACKUP_DIR and config)
    #[arg(long, global = true)]
    backup_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the admin HTTP server
    Serve {
        /// Port to listen on (overrides SREQ_PORT and config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Restore a backup file from the backup directory
    Restore {
        /// Backup file name inside the backup directory
        filename: String,

        /// merge (upsert by natural key) or replace (plain insert)
        #[arg(long, default_value = "merge")]
        mode: RestoreMode,

        /// Delete all existing rows first
        #[arg(long)]
        clear_existing: bool,

        /// Roll back everything on the first failing record
        #[arg(long)]
        abort_on_error: bool,
    },
    /// Export the database into a new backup file
    Backup,
    /// Check configuration, backup directory and database
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let port = match &cli.command {
        Command::Serve { port } => *port,
        _ => None,
    };

    let overrides = ConfigOverrides {
        config_file: cli.config.clone(),
        database_path: cli.database.clone(),
        backup_dir: cli.backup_dir.clone(),
        port,
    };

    let config = ResolvedConfig::resolve(&overrides).context("Failed to resolve configuration")?;

    // Initialize tracing (RUST_LOG wins over the configured level)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("sreq_admin={0},sreq_common={0},tower_http=info", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "sreq-admin v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    info!("Config file: {}", config.config_file.display());

    match cli.command {
        Command::Serve { .. } => serve(config).await,
        Command::Restore {
            filename,
            mode,
            clear_existing,
            abort_on_error,
        } => {
            let options = RestoreOptions {
                mode,
                clear_existing,
                abort_on_record_error: abort_on_error || config.abort_on_record_error,
            };
            run_restore(&config, &filename, options).await
        }
        Command::Backup => run_backup(&config).await,
        Command::Verify => run_verify(&config).await,
    }
}

async fn serve(config: ResolvedConfig) -> Result<()> {
    let tokens =
        TokenRegistry::from_entries(&config.tokens).context("Invalid [auth] token configuration")?;
    if !tokens.has_admin() {
        warn!("No admin token configured; every admin request will be rejected");
    }

    let backups = BackupStore::new(&config.backup_dir);
    backups
        .ensure_dir()
        .with_context(|| format!("Failed to create backup directory {}", config.backup_dir.display()))?;
    info!("Backup directory: {}", config.backup_dir.display());

    let db = init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let state =
        AppState::new(db, backups, tokens).with_abort_on_record_error(config.abort_on_record_error);
    let app = build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Restore from the command line as the local operator
async fn run_restore(config: &ResolvedConfig, filename: &str, options: RestoreOptions) -> Result<()> {
    let operator = Caller::operator();
    info!(
        username = %operator.username,
        %filename,
        mode = %options.mode,
        clear_existing = options.clear_existing,
        "Restore requested from command line"
    );

    let gate = RestoreGate::for_backup_dir(&config.backup_dir);
    let _guard = gate
        .try_acquire()
        .with_context(|| format!("Cannot start restore (lock {})", gate.lock_path().display()))?;

    let store = BackupStore::new(&config.backup_dir);
    let raw = store.load(filename)?;
    let document = BackupDocument::from_value(raw)?;

    let db = init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let result = backup::restore(&db, &document, &options).await?;
    db.close().await;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        bail!("{}", result.message);
    }
    Ok(())
}

async fn run_backup(config: &ResolvedConfig) -> Result<()> {
    let operator = Caller::operator();

    let db = init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let document = backup::create_backup(&db, &operator.username).await?;
    db.close().await;

    let store = BackupStore::new(&config.backup_dir);
    let filename = store.save(&document)?;

    println!("{}", store.dir().join(&filename).display());
    Ok(())
}

async fn run_verify(config: &ResolvedConfig) -> Result<()> {
    let report = verify::run_checks(config).await;
    println!("{}", report);

    if !report.passed() {
        bail!("Deployment verification failed");
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
