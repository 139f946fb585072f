//! Run statistics and snapshots

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use crate::engine::TargetReport;
use crate::registry::TargetRegistry;
use crate::target::{Sample, TargetId, TargetPhase, TargetState};
use crate::MonitorError;

/// Process-wide counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub started_at: DateTime<Utc>,
    pub total_cycles: u64,
    pub total_checks: u64,
    pub total_drowsy_detections: u64,
    pub total_alerts_sent: u64,
}

impl Default for RunStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            total_cycles: 0,
            total_checks: 0,
            total_drowsy_detections: 0,
            total_alerts_sent: 0,
        }
    }
}

/// One pass over all targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleStats {
    pub index: u64,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub checks: u32,
    pub alerts: u32,
    /// Targets with no sample this pass
    pub skipped: u32,
    /// Targets with a non-zero drowsy counter after the pass
    pub drowsy_targets: u32,
}

impl CycleStats {
    pub fn begin(index: u64) -> Self {
        Self {
            index,
            started_at: Utc::now(),
            duration_secs: 0.0,
            checks: 0,
            alerts: 0,
            skipped: 0,
            drowsy_targets: 0,
        }
    }

    /// Count one target's tick
    pub fn record(&mut self, report: &TargetReport) {
        self.checks += 1;
        if report.alert_sent() {
            self.alerts += 1;
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs.max(0.0))
    }
}

/// Per-target view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    pub id: TargetId,
    pub phase: TargetPhase,
    pub checks: u64,
    pub drowsy_checks: u64,
    pub drowsy_rate: f64,
    pub occupied: bool,
    pub drowsy_counter: u32,
    pub last_check: Option<DateTime<Utc>>,
    pub last_alert: Option<DateTime<Utc>>,
    pub history: Vec<Sample>,
}

impl From<&TargetState> for TargetSnapshot {
    fn from(state: &TargetState) -> Self {
        Self {
            id: state.id().clone(),
            phase: state.phase(),
            checks: state.total_checks(),
            drowsy_checks: state.total_drowsy_checks(),
            drowsy_rate: state.drowsy_rate(),
            occupied: state.is_occupied(),
            drowsy_counter: state.drowsy_counter(),
            last_check: state.last_check(),
            last_alert: state.last_alert_at(),
            history: state.history().iter().copied().collect(),
        }
    }
}

/// Consistent copy of all statistics at a cycle boundary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub uptime_secs: f64,
    pub run: RunStats,
    pub last_cycle: Option<CycleStats>,
    pub targets: Vec<TargetSnapshot>,
}

impl StatsSnapshot {
    /// Write as pretty JSON
    pub fn export_json(&self, path: &Path) -> Result<(), MonitorError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| MonitorError::Export(e.to_string()))?;
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|e| MonitorError::Export(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| MonitorError::Export(e.to_string()))
    }
}

/// Accumulates counters and publishes snapshots
pub struct StatsAggregator {
    run: RunStats,
    started: Instant,
    last_cycle: Option<CycleStats>,
    publisher: watch::Sender<StatsSnapshot>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        let (publisher, _) = watch::channel(StatsSnapshot::default());
        Self {
            run: RunStats::default(),
            started: Instant::now(),
            last_cycle: None,
            publisher,
        }
    }

    pub fn run(&self) -> &RunStats {
        &self.run
    }

    pub fn last_cycle(&self) -> Option<&CycleStats> {
        self.last_cycle.as_ref()
    }

    /// Receiver of the snapshot published after each cycle
    pub fn subscribe(&self) -> watch::Receiver<StatsSnapshot> {
        self.publisher.subscribe()
    }

    /// Fold one target's tick into the run counters
    pub fn record(&mut self, report: &TargetReport) {
        self.run.total_checks += 1;
        counter!("seatwatch_checks_total").increment(1);

        if report.transition.is_drowsy() {
            self.run.total_drowsy_detections += 1;
            counter!("seatwatch_drowsy_detections_total").increment(1);
        }
        if report.alert_sent() {
            self.run.total_alerts_sent += 1;
            counter!("seatwatch_alerts_sent_total").increment(1);
        }
    }

    /// Close a cycle and publish a fresh snapshot
    pub fn finish_cycle(&mut self, mut cycle: CycleStats, registry: &TargetRegistry) {
        cycle.drowsy_targets = registry.iter().filter(|s| s.drowsy_counter() > 0).count() as u32;
        self.run.total_cycles += 1;
        counter!("seatwatch_cycles_total").increment(1);
        self.last_cycle = Some(cycle);

        let snapshot = self.snapshot(registry);
        self.publisher.send_replace(snapshot);
    }

    pub fn snapshot(&self, registry: &TargetRegistry) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.started.elapsed().as_secs_f64(),
            run: self.run.clone(),
            last_cycle: self.last_cycle.clone(),
            targets: registry.iter().map(TargetSnapshot::from).collect(),
        }
    }

    /// Log a human-readable summary
    pub fn log_summary(&self, registry: &TargetRegistry) {
        let uptime = self.started.elapsed().as_secs();
        info!("=== Monitoring summary ===");
        info!(
            "Uptime {}h {}m {}s, cycles {}, checks {}, drowsy detections {}, alerts sent {}",
            uptime / 3600,
            (uptime % 3600) / 60,
            uptime % 60,
            self.run.total_cycles,
            self.run.total_checks,
            self.run.total_drowsy_detections,
            self.run.total_alerts_sent
        );

        for state in registry.iter().filter(|s| s.total_checks() > 0) {
            info!(
                "  {}: {} checks, {} drowsy ({:.1}%), counter {}, {}",
                state.id(),
                state.total_checks(),
                state.total_drowsy_checks(),
                state.drowsy_rate() * 100.0,
                state.drowsy_counter(),
                if state.is_occupied() { "occupied" } else { "empty" }
            );
        }
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}
