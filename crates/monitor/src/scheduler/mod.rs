//! Cycle scheduling
//!
//! Two drivers feed the same [`TargetMonitor`]:
//! - [`RoiScheduler`]: one composite frame per cycle, all seats checked concurrently
//! - [`SequentialScheduler`]: one channel at a time through a viewer switch

mod roi;
mod sequential;

pub use roi::{RoiScheduler, RoiTiming, Seat};
pub use sequential::{SequentialScheduler, SequentialTiming};

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::debug::DebugWriter;
use crate::engine::TargetMonitor;
use crate::registry::TargetRegistry;
use crate::stats::{CycleStats, StatsAggregator, StatsSnapshot};

/// Shutdown signal observed by the control loop
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Create a shutdown trigger and its receiving side
pub fn shutdown_channel() -> (watch::Sender<bool>, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (tx, Shutdown { rx })
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested. Never resolves if the sender is gone.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `duration`. Returns `false` if shutdown cut the sleep short.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.wait() => false,
        }
    }
}

/// Everything both drivers share: the update contract, target states,
/// statistics and reporting
pub struct MonitorCore<D, N> {
    pub(crate) monitor: TargetMonitor<D, N>,
    pub(crate) registry: TargetRegistry,
    pub(crate) stats: StatsAggregator,
    pub(crate) debug: Option<DebugWriter>,
    summary_interval: Duration,
    last_summary: Instant,
    export_path: Option<PathBuf>,
}

impl<D, N> MonitorCore<D, N> {
    pub fn new(monitor: TargetMonitor<D, N>) -> Self {
        Self {
            monitor,
            registry: TargetRegistry::new(),
            stats: StatsAggregator::new(),
            debug: None,
            summary_interval: Duration::from_secs(300),
            last_summary: Instant::now(),
            export_path: None,
        }
    }

    /// Periodic summary interval and optional JSON export target
    pub fn with_summary(mut self, interval: Duration, export_path: Option<PathBuf>) -> Self {
        self.summary_interval = interval;
        self.export_path = export_path;
        self
    }

    pub fn with_debug(mut self, debug: Option<DebugWriter>) -> Self {
        self.debug = debug;
        self
    }

    pub fn monitor(&self) -> &TargetMonitor<D, N> {
        &self.monitor
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    pub fn subscribe(&self) -> watch::Receiver<StatsSnapshot> {
        self.stats.subscribe()
    }

    /// Close a cycle, then log a summary if one is due
    pub(crate) fn end_cycle(&mut self, cycle: CycleStats) -> CycleStats {
        self.stats.finish_cycle(cycle, &self.registry);
        let cycle = self
            .stats
            .last_cycle()
            .cloned()
            .unwrap_or_else(|| CycleStats::begin(0));

        info!(
            "Cycle {} done in {:.1}s: {} checks, {} alerts, {} skipped, {} drowsy",
            cycle.index,
            cycle.duration_secs,
            cycle.checks,
            cycle.alerts,
            cycle.skipped,
            cycle.drowsy_targets
        );

        if self.last_summary.elapsed() >= self.summary_interval {
            self.report();
            self.last_summary = Instant::now();
        }
        cycle
    }

    fn report(&self) {
        self.stats.log_summary(&self.registry);
        if let Some(path) = &self.export_path {
            if let Err(e) = self.stats.snapshot(&self.registry).export_json(path) {
                warn!("{}", e);
            }
        }
    }

    /// Final summary on shutdown
    pub(crate) fn finish(&self) -> StatsSnapshot {
        info!("Monitoring stopped");
        self.report();
        self.stats.snapshot(&self.registry)
    }
}
