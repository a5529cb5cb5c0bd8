// crates/trunkline-cli/src/main.rs
// ============================================================================
// Module: Trunkline CLI Entry Point
// Description: Command dispatcher for the webhook routing engine.
// Purpose: Serve the engine and validate deployment configuration.
// Dependencies: clap, tokio, tracing-subscriber, trunkline-server
// ============================================================================

//! ## Overview
//! The `trunkline` binary has two jobs: run the webhook server against a
//! validated configuration, and validate a configuration without serving.
//! Logging goes through the tracing subscriber with the conventional
//! `RUST_LOG` environment filter.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use clap::Subcommand;
use trunkline_server::ServerState;
use trunkline_server::config::TrunklineConfig;

// ============================================================================
// SECTION: CLI Definition
// ============================================================================

/// Multi-tenant routing engine for carrier-driven voice calls.
#[derive(Debug, Parser)]
#[command(name = "trunkline", version, about)]
struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the webhook endpoints until interrupted.
    Serve {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: PathBuf,
    },
    /// Validate a configuration file and print a summary.
    CheckConfig {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: PathBuf,
    },
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            config,
        } => serve(&config),
        Command::CheckConfig {
            config,
        } => check_config(&config),
    }
}

/// Installs the fmt subscriber with the `RUST_LOG` filter.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Runs the webhook server until ctrl-c.
fn serve(config_path: &PathBuf) -> ExitCode {
    let config = match TrunklineConfig::load(config_path) {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "configuration rejected");
            return ExitCode::FAILURE;
        }
    };
    let bind: SocketAddr = match config.server.bind.parse() {
        Ok(bind) => bind,
        Err(_) => {
            tracing::error!(bind = config.server.bind.as_str(), "bind address invalid");
            return ExitCode::FAILURE;
        }
    };
    let assembled = match trunkline_server::bootstrap(&config) {
        Ok(assembled) => assembled,
        Err(error) => {
            tracing::error!(error = error.as_str(), "engine bootstrap failed");
            return ExitCode::FAILURE;
        }
    };
    let state = ServerState {
        pipeline: assembled.pipeline,
        tenants: assembled.tenants,
        max_body_bytes: config.server.max_body_bytes,
        request_timeout: Duration::from_millis(config.server.request_timeout_ms),
    };
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!(%error, "tokio runtime failed to start");
            return ExitCode::FAILURE;
        }
    };
    let outcome = runtime.block_on(async move {
        tokio::select! {
            served = trunkline_server::serve(bind, state) => served,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                Ok(())
            }
        }
    });
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = error.as_str(), "server exited with failure");
            ExitCode::FAILURE
        }
    }
}

/// Validates a configuration file and logs a one-line summary.
fn check_config(config_path: &PathBuf) -> ExitCode {
    match TrunklineConfig::load(config_path) {
        Ok(config) => {
            tracing::info!(
                bind = config.server.bind.as_str(),
                sqlite = %config.store.sqlite.path.display(),
                request_timeout_ms = config.server.request_timeout_ms,
                "configuration ok"
            );
            ExitCode::SUCCESS
        }
        Err(error) => {
            tracing::error!(%error, "configuration rejected");
            ExitCode::FAILURE
        }
    }
}
