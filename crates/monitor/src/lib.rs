//! SeatWatch Monitor
//!
//! The monitoring control loop: per-target hysteresis state, the target
//! registry, statistics, and the two cycle drivers (concurrent ROI and
//! sequential channel switching).

pub mod config;
pub mod debug;
pub mod engine;
pub mod error;
pub mod logging;
pub mod registry;
pub mod scheduler;
pub mod stats;
pub mod target;

pub use config::{Mode, Settings};
pub use engine::{TargetMonitor, TargetReport};
pub use error::MonitorError;
pub use logging::{init_logging, LogFormat};
pub use registry::TargetRegistry;
pub use scheduler::{shutdown_channel, MonitorCore, RoiScheduler, SequentialScheduler, Shutdown};
pub use stats::{CycleStats, RunStats, StatsAggregator, StatsSnapshot, TargetSnapshot};
pub use target::{Observation, ResetPolicy, Sample, TargetId, TargetState, Thresholds, Transition};

use std::net::SocketAddr;

use alerting::{AlertGate, NotifierSet};
use detector::{LandmarkClassifier, LandmarkDetector, RemoteLandmarkProvider};
use frame_capture::{CommandSwitcher, SnapshotSource};
use metrics_exporter_prometheus::PrometheusBuilder;
use occupancy::OccupancyStrategy;
use tracing::{info, warn};

use crate::debug::DebugWriter;
use crate::scheduler::{RoiTiming, Seat, SequentialTiming};

/// Serve Prometheus metrics on `addr`
pub fn install_metrics_exporter(addr: SocketAddr) -> Result<(), MonitorError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MonitorError::Metrics(e.to_string()))?;
    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

/// Send a connection test through every configured notifier channel.
/// Fails only when no channel delivered.
pub async fn test_notifiers(settings: &Settings) -> Result<(), MonitorError> {
    let notifiers = NotifierSet::from_config(&settings.notifier)?;
    let results = notifiers.test_channels().await;

    let mut delivered = 0;
    for (name, result) in &results {
        match result {
            Ok(()) => {
                delivered += 1;
                info!("Notifier {}: ok", name);
            }
            Err(e) => warn!("Notifier {}: {}", name, e),
        }
    }

    if delivered == 0 {
        return Err(alerting::AlertError::AllFailed(results.len()).into());
    }
    Ok(())
}

async fn announce(notifiers: &NotifierSet, text: &str) {
    if let Err(e) = notifiers.send_system_message(text).await {
        warn!("System message not delivered: {}", e);
    }
}

/// Build the configured loop and run it until shutdown
pub async fn run(settings: Settings, shutdown: Shutdown) -> Result<StatsSnapshot, MonitorError> {
    settings.validate()?;

    let detection = &settings.detection;
    let detector_config = detection.detector_config();
    let detector = LandmarkDetector::new(
        RemoteLandmarkProvider::from_config(&detector_config)?,
        LandmarkClassifier::new(detector_config),
    );
    let notifiers = NotifierSet::from_config(&settings.notifier)?;
    let gate = AlertGate::new(settings.alert_config(), notifiers.clone());

    let debug = settings.debug.then(|| {
        info!("Debug frames go to {}", settings.output.debug_dir.display());
        DebugWriter::new(settings.output.debug_dir.clone())
    });
    let schedule = &settings.schedule;

    info!(
        "Thresholds: confidence {:.2}, drowsy count {}, cooldown {}s, reset {:?}",
        detection.confidence_threshold,
        detection.drowsy_threshold,
        detection.alert_cooldown_secs,
        detection.alert_reset
    );

    let targets = match schedule.mode {
        Mode::Roi => settings.roi.enabled_seats().len(),
        Mode::Sequential => settings.sequential.total_channels as usize,
    };
    announce(
        &notifiers,
        &format!(
            "SeatWatch started in {} mode, monitoring {} targets",
            schedule.mode.as_str(),
            targets
        ),
    )
    .await;

    let snapshot = match schedule.mode {
        Mode::Roi => {
            let monitor = TargetMonitor::new(
                detector,
                gate,
                OccupancyStrategy::pixel_statistics(settings.occupancy.clone()),
                detection.thresholds(),
                detection.detector_timeout(),
            );
            let core = MonitorCore::new(monitor)
                .with_summary(schedule.summary_interval(), settings.output.stats_export_path.clone())
                .with_debug(debug);

            let disabled = settings.roi.seats.values().filter(|s| !s.enabled).count();
            if disabled > 0 {
                info!("{} disabled seats ignored", disabled);
            }
            let seats = settings
                .roi
                .enabled_seats()
                .into_iter()
                .map(|(id, roi)| Seat { id, roi })
                .collect();

            let source = SnapshotSource::new(settings.roi.source.clone())?;
            RoiScheduler::new(core, source, seats, RoiTiming::from(schedule))
                .run(shutdown)
                .await
        }
        Mode::Sequential => {
            let sequential = &settings.sequential;
            let monitor = TargetMonitor::new(
                detector,
                gate,
                OccupancyStrategy::DetectorSignal,
                detection.thresholds(),
                detection.detector_timeout(),
            );
            let core = MonitorCore::new(monitor)
                .with_summary(schedule.summary_interval(), settings.output.stats_export_path.clone())
                .with_debug(debug);

            let switcher = CommandSwitcher::new(
                sequential.switch_command.clone(),
                sequential.button_map()?,
                sequential.total_channels,
            )?;
            let source = SnapshotSource::new(sequential.capture.clone())?;
            SequentialScheduler::new(
                core,
                switcher,
                source,
                SequentialTiming::from_settings(schedule, sequential),
            )
            .run(shutdown)
            .await
        }
    };

    announce(
        &notifiers,
        &format!(
            "SeatWatch stopped after {} cycles, {} alerts sent",
            snapshot.run.total_cycles, snapshot.run.total_alerts_sent
        ),
    )
    .await;

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::AlertError;

    #[tokio::test]
    async fn test_notifier_check_passes_with_console() {
        assert!(test_notifiers(&Settings::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_notifier_check_fails_when_nothing_delivers() {
        let mut settings = Settings::default();
        settings.notifier.console = false;
        settings.notifier.webhook_url = Some("http://127.0.0.1:9/hook".to_string());
        settings.notifier.timeout_secs = 0.5;

        assert!(matches!(
            test_notifiers(&settings).await,
            Err(MonitorError::Alert(AlertError::AllFailed(1)))
        ));
    }
}
