// crates/warden-cli/src/main.rs
// ============================================================================
// Module: Warden CLI Entry Point
// Description: Command dispatcher for the control-plane process.
// Purpose: Resolve configuration, open the store, serve, and map exit codes.
// Dependencies: axum, clap, tokio, tracing, warden-kernel, warden-server,
//               warden-store-sqlite
// ============================================================================

//! ## Overview
//! The `warden` binary resolves the documented environment variables, opens
//! the store (applying the migration ladder and claiming the instance lock),
//! and serves the HTTP/WebSocket surface on loopback. Exit codes: 0 success,
//! 2 configuration error, 3 store migration failure, 4 lease contention,
//! 5 signal-induced shutdown.

// ============================================================================
// SECTION: Modules
// ============================================================================

/// Environment-driven configuration.
mod config;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use clap::Subcommand;
use warden_core::OwnerId;
use warden_core::SystemClock;
use warden_kernel::Kernel;
use warden_server::bootstrap_kernel;
use warden_server::build_router;
use warden_server::build_state;
use warden_store_sqlite::ControlStore;
use warden_store_sqlite::SqliteStoreConfig;
use warden_store_sqlite::SqliteStoreError;

use crate::config::ProcessConfig;

// ============================================================================
// SECTION: Exit Codes
// ============================================================================

/// Success.
const EXIT_OK: u8 = 0;
/// Configuration error.
const EXIT_CONFIG: u8 = 2;
/// Store migration failure.
const EXIT_MIGRATION: u8 = 3;
/// Lease contention: another instance holds the database.
const EXIT_CONTENTION: u8 = 4;
/// Signal-induced shutdown.
const EXIT_SIGNAL: u8 = 5;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "warden", version, about = "Agent-execution control plane")]
struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Supported subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP and WebSocket surface.
    Serve {
        /// Loopback bind address.
        #[arg(long, default_value = "127.0.0.1:8787")]
        bind: SocketAddr,
    },
    /// Apply pending migrations and exit.
    Migrate,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();
    let config = match ProcessConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "configuration rejected");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    match cli.command {
        Command::Migrate => migrate(&config),
        Command::Serve {
            bind,
        } => serve(&config, bind),
    }
}

/// Maps a store-open failure onto the documented exit codes.
fn open_failure_exit(err: &SqliteStoreError) -> ExitCode {
    match err {
        SqliteStoreError::Contention(_) => ExitCode::from(EXIT_CONTENTION),
        SqliteStoreError::Invalid(_) => ExitCode::from(EXIT_CONFIG),
        _ => ExitCode::from(EXIT_MIGRATION),
    }
}

/// Opens the store with the process configuration.
fn open_store(config: &ProcessConfig) -> Result<ControlStore, SqliteStoreError> {
    let clock = SystemClock;
    ControlStore::open(
        SqliteStoreConfig::for_path(config.database_path()),
        OwnerId::generate(),
        warden_core::Clock::now(&clock),
    )
}

/// Runs the migrate subcommand.
fn migrate(config: &ProcessConfig) -> ExitCode {
    match open_store(config) {
        Ok(store) => {
            tracing::info!(path = %config.database_path().display(), "migrations applied");
            drop(store);
            ExitCode::from(EXIT_OK)
        }
        Err(err) => {
            tracing::error!(error = %err, "store open failed");
            open_failure_exit(&err)
        }
    }
}

/// Runs the serve subcommand.
fn serve(config: &ProcessConfig, bind: SocketAddr) -> ExitCode {
    if !bind.ip().is_loopback() {
        tracing::error!(%bind, "refusing non-loopback bind address");
        return ExitCode::from(EXIT_CONFIG);
    }
    let store = match open_store(config) {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(error = %err, "store open failed");
            return open_failure_exit(&err);
        }
    };
    let kernel = Kernel::assemble(store, Arc::new(SystemClock), None, config.runner_config());
    if let Err(err) = bootstrap_kernel(&kernel) {
        tracing::error!(error = %err, "kernel bootstrap failed");
        return ExitCode::from(EXIT_MIGRATION);
    }
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "tokio runtime init failed");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    let heartbeat = Duration::from_secs(
        u64::try_from(config.heartbeat_interval_seconds).unwrap_or(150),
    );
    runtime.block_on(async move {
        spawn_maintenance(&kernel, heartbeat);
        let state = build_state(
            kernel,
            config.admin_token.clone(),
            config.control_token.clone(),
        );
        let router = build_router(state);
        let listener = match tokio::net::TcpListener::bind(bind).await {
            Ok(listener) => listener,
            Err(err) => {
                tracing::error!(error = %err, %bind, "bind failed");
                return ExitCode::from(EXIT_CONFIG);
            }
        };
        tracing::info!(%bind, "warden serving");
        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        match axum::serve(listener, router).with_graceful_shutdown(shutdown).await {
            Ok(()) => {
                tracing::info!("shutdown signal received");
                ExitCode::from(EXIT_SIGNAL)
            }
            Err(err) => {
                tracing::error!(error = %err, "server failed");
                ExitCode::from(EXIT_MIGRATION)
            }
        }
    })
}

/// Spawns the instance heartbeat and recovery sweep loops.
fn spawn_maintenance(kernel: &Kernel, interval: Duration) {
    let heartbeat_kernel = kernel.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let now = heartbeat_kernel.ctx.now();
            if let Err(err) = heartbeat_kernel.ctx.store.heartbeat_instance(now) {
                tracing::error!(error = %err, "instance heartbeat failed");
            }
            match heartbeat_kernel.recovery.run_sweep() {
                Ok(report) => {
                    heartbeat_kernel.metrics.incr_sweeps();
                    if !report.expired.is_empty() {
                        tracing::info!(
                            expired = report.expired.len(),
                            recovered = report.recovered.len(),
                            failed_tasks = report.failed_tasks,
                            "recovery sweep"
                        );
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "recovery sweep failed");
                }
            }
        }
    });
}
