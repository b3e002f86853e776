//! Persephone Console - Entry Point
//!
//! Drives a run through upload, prepare, deploy and monitor against the
//! Persephone control plane.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use persephone::app::options::{AppOptions, Command, Overrides};
use persephone::app::run::run;
use persephone::logs::{init_logging, LogOptions};
use persephone::storage::settings::load_or_init;
use persephone::utils::version_info;

use tracing::{error, info};

const USAGE: &str = "usage: persephone [--data-dir=<dir>] [--api=<url>] [--log-level=<level>] \
<--version | --status | --upload=<file> | --prepare [--run-id=<id>] [--gpu=<id>] [--start] | \
--deploy [--run-id=<id>] [--env=dev|stage|prod] [--start] [--watch-secs=<n>] | \
--monitor [--run-id=<id>] | --route=<path>>";

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to render version: {e}"),
        }
        return ExitCode::SUCCESS;
    }

    let overrides = match Overrides::from_args(&cli_args) {
        Ok(overrides) => overrides,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };
    let command = match Command::from_args(&cli_args) {
        Ok(Some(command)) => command,
        Ok(None) => {
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    // Retrieve the settings file
    let layout = overrides.layout();
    if let Err(e) = layout.setup().await {
        eprintln!("Unable to create {}: {e}", layout.base_dir.display());
        return ExitCode::FAILURE;
    }
    let settings = match load_or_init(&layout.settings_file()).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: overrides
            .log_level
            .clone()
            .unwrap_or_else(|| settings.log_level.clone()),
        log_dir: Some(layout.logs_dir().path().to_path_buf()),
        json_format: settings.json_logs,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions::from_settings(&settings, layout, &overrides);
    info!("Running Persephone console with options: {:?}", options);

    match run(command, options, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Command failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Ctrl+C received, shutting down...");
                }
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C received, shutting down..."),
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        }
    }
}
