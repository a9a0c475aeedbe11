//! VitaPad GUI - Main Entry Point
//!
//! Headless monitor: connects to a Vita and prints the connection state as
//! the UI store sees it.

use std::path::PathBuf;

use anyhow::{Context, anyhow};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use vitapad_gui::app::application::run_app;
use vitapad_gui::constants::LOG_FILE_PREFIX;
use vitapad_gui::domain::config::{AppConfig, LoggingConfig};
use vitapad_gui::helpers::get_or_create_data_dir;

/// Connect to a Vita and follow the control connection state.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// IP address of the Vita to connect to
    ip: Option<String>,

    /// Port to connect to (default: 5000)
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable trace logging (also `debug = true` under [logging])
    #[arg(short, long)]
    debug: bool,

    /// Print a sample configuration file and exit
    #[arg(short, long)]
    sample_config: bool,

    /// Save the effective configuration (file, environment and arguments) and exit
    #[arg(short, long)]
    write_config: bool,
}

fn init_tracing(config: &LoggingConfig, debug: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = if debug {
        EnvFilter::new("trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
    };

    let (file_layer, guard) = if config.file {
        let dir = get_or_create_data_dir().context("Failed to create log directory")?;
        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.sample_config {
        print!("{}", AppConfig::sample());
        return Ok(());
    }

    let mut config =
        AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let _log_guard = init_tracing(&config.logging, args.debug || config.logging.debug)?;

    if args.write_config {
        if let Some(ip) = &args.ip {
            config.connection.ip = Some(ip.clone());
        }
        if let Some(port) = args.port {
            config.connection.port = port;
        }
        let path = match args.config {
            Some(path) => path,
            None => AppConfig::default_path().context("Failed to locate config directory")?,
        };
        config
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    let ip = args
        .ip
        .or_else(|| config.connection.ip.clone())
        .ok_or_else(|| anyhow!("IP address is required (argument or [connection] ip in config)"))?;
    let port = args.port.unwrap_or(config.connection.port);

    tracing::info!("Starting VitaPad GUI monitor v{}", env!("CARGO_PKG_VERSION"));

    let last_error = run_app(&ip, port, &config.connection)
        .with_context(|| format!("Failed to monitor {ip}:{port}"))?;

    if let Some(error) = last_error {
        return Err(anyhow!("Disconnected: {error}"));
    }
    println!("Disconnected");

    Ok(())
}
