//! Modbus register watcher.
//!
//! Polls Modbus devices (TCP or RTU/serial) and logs every register whose
//! value changed between two polls.

use anyhow::{Context, Result};
use clap::Parser;
use modbus_watch::config::ModbusWatchConfig;
use modbus_watch::logging::{LoggingConfig, init_tracing};
use modbus_watch::poller::DevicePoller;
use std::path::PathBuf;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{error, info};

/// Watches Modbus registers (TCP/RTU) and logs every change.
#[derive(Parser, Debug)]
#[command(name = "modbus-watch")]
#[command(about = "Polls Modbus devices and logs register changes")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "modbus-watch.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = ModbusWatchConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Initialize logging
    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    init_tracing(&log_config).context("Failed to init tracing")?;

    info!("Starting modbus-watch");
    info!("Loaded configuration from {:?}", args.config);

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start a blocking poller task for each device
    let mut tasks = Vec::new();

    for device in &config.modbus.devices {
        info!(
            "Starting poller for device '{}' ({:?})",
            device.name, device.connection
        );

        let poller = DevicePoller::new(device.clone(), Handle::current(), shutdown_rx.clone());
        let task = tokio::task::spawn_blocking(move || poller.run());
        tasks.push((device.name.clone(), task));
    }

    info!(
        "Modbus watcher running with {} device(s)",
        config.modbus.devices.len()
    );

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);
    for (name, task) in tasks {
        if let Err(e) = task.await {
            error!("Poller for device '{}' failed: {}", name, e);
        }
    }

    info!("Modbus watcher stopped");

    Ok(())
}
