//! buildcast - Entry Point
//!
//! Starts the build/deploy daemon from a YAML or JSON config file.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use buildcast::app::options::AppOptions;
use buildcast::app::run::run;
use buildcast::filesys::file::File;
use buildcast::logs::{init_logging, LogLevel, LogOptions};
use buildcast::storage::settings::Settings;
use buildcast::utils::version_info;

/// Build and deploy trigger daemon with live log streaming
#[derive(Debug, Parser)]
#[command(name = "buildcast", disable_version_flag = true)]
struct Args {
    /// Config file (YAML, or JSON with a .json extension)
    #[arg(short, long, env = "BUILDCAST_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Override the configured bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the configured port
    #[arg(long)]
    port: Option<u16>,

    /// Print version information and exit
    #[arg(long)]
    version: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Print version and exit
    let version = version_info();
    if args.version {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to encode version: {e}"),
        }
        return;
    }

    // Retrieve the settings file
    let mut settings = match load_settings(&args).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to load settings: {e:#}");
            std::process::exit(1);
        }
    };
    if let Some(log_level) = args.log_level {
        settings.log_level = log_level;
    }

    // Initialize logging; the guard flushes file logs on exit
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.clone(),
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

    let mut options = AppOptions::from_settings(&settings);
    if let Some(host) = args.host {
        options.server.host = host;
    }
    if let Some(port) = args.port {
        options.server.port = port;
    }

    info!(
        version = %version.version,
        git_hash = %version.git_hash,
        "Running buildcast with options: {:?}",
        options
    );
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run buildcast: {e}");
        std::process::exit(1);
    }
}

async fn load_settings(args: &Args) -> anyhow::Result<Settings> {
    let file = File::new(&args.config);
    let settings = Settings::load(&file)
        .await
        .with_context(|| format!("reading {}", args.config.display()))?;
    Ok(settings)
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Failed to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
