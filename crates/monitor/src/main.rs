//! SeatWatch - Main Entry Point

use std::path::PathBuf;

use clap::Parser;
use monitor::config::DEFAULT_SETTINGS_PATH;
use monitor::{
    init_logging, install_metrics_exporter, run, shutdown_channel, test_notifiers, Mode, Settings,
};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Multi-seat drowsiness monitor
#[derive(Debug, Parser)]
#[command(name = "seatwatch", version, about)]
struct Args {
    /// Write annotated debug frames and log at debug level
    #[arg(long)]
    debug: bool,

    /// Settings file (TOML, JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sampling mode, overriding the settings file
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Send a test message through each notifier channel and exit
    #[arg(long)]
    test_notifiers: bool,
}

async fn shutdown_signal(tx: watch::Sender<bool>) {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    error!("Cannot install SIGTERM handler: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                    let _ = tx.send(true);
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown signal received");
    let _ = tx.send(true);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(mode) = args.mode {
        settings.schedule.mode = mode;
    }
    settings.debug = args.debug;

    init_logging(
        settings.output.log_format,
        if args.debug { "debug" } else { "info" },
    );

    info!("=== SeatWatch v{} ===", env!("CARGO_PKG_VERSION"));
    match &settings.source {
        Some(path) => info!("Settings loaded from {}", path.display()),
        None => warn!("No settings file at {}, using defaults", DEFAULT_SETTINGS_PATH),
    }

    if args.test_notifiers {
        if let Err(e) = test_notifiers(&settings).await {
            error!("Notifier test failed: {}", e);
            return Err(e.into());
        }
        return Ok(());
    }

    info!("Mode: {}", settings.schedule.mode.as_str());

    if let Some(addr) = settings.output.metrics_addr {
        install_metrics_exporter(addr)?;
    }

    let (tx, shutdown) = shutdown_channel();
    tokio::spawn(shutdown_signal(tx));

    let snapshot = match run(settings, shutdown).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("Startup failed: {}", e);
            return Err(e.into());
        }
    };

    info!(
        "Exiting after {} cycles, {} alerts sent",
        snapshot.run.total_cycles, snapshot.run.total_alerts_sent
    );
    Ok(())
}
