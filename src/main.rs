//! Service host.
//!
//! Loads configuration, builds the service registry, and runs the selected
//! services behind a gRPC server and a Prometheus exporter until SIGINT or
//! SIGTERM.
//!
//! # Architecture Overview
//!
//! ```text
//!   config.toml + flags
//!          │
//!          ▼
//!   ┌──────────────┐   resolve    ┌─────────────────┐
//!   │ Application  │─────────────▶│ ServiceRegistry │──▶ abs, child, ...
//!   └──────┬───────┘              └─────────────────┘
//!          │ attach / register / start
//!          ▼
//!   ┌──────────────┐  ┌──────────────┐
//!   │   Exporter   │  │  gRPC server │
//!   └──────┬───────┘  └──────┬───────┘
//!          └───────┬─────────┘
//!                  ▼
//!        ShutdownCoordinator ◀── SignalWatcher (SIGINT/SIGTERM)
//! ```

use std::process::ExitCode;

use clap::Parser;

use service_host::cli::Cli;
use service_host::config::{ConfigError, ObservabilityConfig};
use service_host::lifecycle::{Application, SignalWatcher};
use service_host::observability::logging::init_logging;
use service_host::services::default_registry;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(ConfigError::Validation(errors)) => {
            let _ = init_logging(&ObservabilityConfig::default());
            for error in &errors {
                tracing::error!(%error, "Invalid configuration");
            }
            return ExitCode::FAILURE;
        }
        Err(e) => {
            let _ = init_logging(&ObservabilityConfig::default());
            tracing::error!(path = %cli.config.display(), error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.observability) {
        eprintln!("failed to initialize logging: {e}");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        grpc = %config.grpc.bind_address(),
        exporter = %config.exporter.bind_address(),
        exporter_enabled = config.exporter.enabled,
        "service-host starting"
    );

    let registry = match default_registry() {
        Ok(registry) => registry,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build service registry");
            return ExitCode::FAILURE;
        }
    };

    let signals = SignalWatcher::watch();
    let mut app = Application::new(config, registry);

    match app.start(&signals).await {
        Ok(report) => {
            if !report.is_clean() {
                tracing::warn!(
                    failed = ?report.failed,
                    timed_out = ?report.timed_out,
                    "Shutdown finished with unresponsive servers"
                );
            }
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Application failed");
            ExitCode::FAILURE
        }
    }
}
