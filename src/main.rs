//! mixbridge
//!
//! Reads slider positions from a serial or UDP controller and routes them to
//! volume targets, with the mapping reloaded live from `config.toml`.
//!
//! # Architecture Overview
//!
//! ```text
//!   config.toml ──▶ ConfigWatcher ──▶ ConfigStore ──▶ subscribers
//!                                         │
//!                                         ▼ current()
//!   device ──▶ Controller ──▶ event bus ──▶ TargetRouter ──▶ VolumeSink
//!
//!   Orchestrator: startup, stop signal, ordered shutdown
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use mixbridge::config::{ConfigStore, SourceLocator};
use mixbridge::lifecycle::{Orchestrator, OrchestratorOptions, RunMode};
use mixbridge::notification::LogNotifier;
use mixbridge::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "mixbridge", version, about = "Slider controller to volume bridge")]
struct Cli {
    /// Use this config.toml instead of searching for one
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    tracing::info!("mixbridge v{} starting", env!("CARGO_PKG_VERSION"));

    match RunMode::from_env() {
        RunMode::Foreground => tracing::info!("Tray icon disabled, running in foreground"),
        RunMode::Tray => tracing::info!("No tray backend on this build, running in foreground"),
    }

    let store = Arc::new(ConfigStore::new(
        SourceLocator::from_environment(),
        Arc::new(LogNotifier),
    ));

    let mut orchestrator = Orchestrator::new(store).with_options(OrchestratorOptions {
        config_path: cli.config,
        ..OrchestratorOptions::default()
    });

    if let Err(e) = orchestrator.initialize().await {
        tracing::error!(error = %e, "Failed to initialize");
        logging::flush();
        return ExitCode::FAILURE;
    }

    match orchestrator.run().await {
        Ok(report) => {
            tracing::info!(reason = ?report.reason, "Exiting");
            ExitCode::from(report.exit_code())
        }
        Err(e) => {
            tracing::error!(error = %e, "Run loop failed");
            logging::flush();
            ExitCode::FAILURE
        }
    }
}
