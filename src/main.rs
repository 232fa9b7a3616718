// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use urban_fleet_console::config::{ConsoleConfig, LogFormat};
use urban_fleet_console::restore::RestoreCodeSweeper;
use urban_fleet_console::Console;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer().compact()).init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match ConsoleConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.log_format);

    let console = match Console::open(&config) {
        Ok(console) => console,
        Err(e) => {
            tracing::error!(code = e.error_code(), error = %e, "Failed to open console");
            eprintln!("{}", e.user_message());
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    let sweeper = RestoreCodeSweeper::new(console.restore_authority(), config.sweep_interval);
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));

    tracing::info!(data_dir = %config.data_dir.display(), "Urban fleet console ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }

    tracing::info!("Shutting down");
    shutdown.cancel();
    if let Err(e) = sweeper_handle.await {
        tracing::error!(error = %e, "Restore code sweeper task failed");
        return ExitCode::FAILURE;
    }

    drop(console);
    ExitCode::SUCCESS
}
