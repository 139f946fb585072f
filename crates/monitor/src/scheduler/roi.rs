//! Concurrent region-of-interest driver

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use alerting::Notifier;
use detector::Detector;
use frame_capture::{CaptureError, Frame, FrameSource, Roi};
use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{MonitorCore, Shutdown};
use crate::config::ScheduleSettings;
use crate::debug::seat_color;
use crate::engine::TargetMonitor;
use crate::stats::{CycleStats, StatsSnapshot};
use crate::target::TargetId;

/// A seat and its region of the composite frame
#[derive(Debug, Clone, PartialEq)]
pub struct Seat {
    pub id: TargetId,
    pub roi: Roi,
}

/// ROI loop timing
#[derive(Debug, Clone, Copy)]
pub struct RoiTiming {
    pub cycle_interval: Duration,
    pub capture_retry_delay: Duration,
    pub capture_timeout: Duration,
}

impl Default for RoiTiming {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(2),
            capture_retry_delay: Duration::from_secs(5),
            capture_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ScheduleSettings> for RoiTiming {
    fn from(schedule: &ScheduleSettings) -> Self {
        Self {
            cycle_interval: schedule.cycle_interval(),
            capture_retry_delay: schedule.capture_retry_delay(),
            capture_timeout: schedule.capture_timeout(),
        }
    }
}

/// Samples every seat of one composite frame per cycle
pub struct RoiScheduler<S, D, N> {
    core: MonitorCore<D, N>,
    source: S,
    seats: Vec<Seat>,
    timing: RoiTiming,
    cycle_index: u64,
    warned: HashSet<TargetId>,
}

impl<S: FrameSource, D: Detector, N: Notifier> RoiScheduler<S, D, N> {
    pub fn new(mut core: MonitorCore<D, N>, source: S, seats: Vec<Seat>, timing: RoiTiming) -> Self {
        for seat in &seats {
            core.registry.get_or_insert(&seat.id);
        }
        Self {
            core,
            source,
            seats,
            timing,
            cycle_index: 0,
            warned: HashSet::new(),
        }
    }

    pub fn core(&self) -> &MonitorCore<D, N> {
        &self.core
    }

    async fn capture(&mut self) -> Result<Frame, CaptureError> {
        match tokio::time::timeout(self.timing.capture_timeout, self.source.capture()).await {
            Ok(result) => result,
            Err(_) => Err(CaptureError::Timeout),
        }
    }

    /// Crop every seat; seats whose region does not fit are left out
    fn crop_seats(&mut self, frame: &Frame) -> HashMap<TargetId, Frame> {
        let mut crops = HashMap::with_capacity(self.seats.len());
        for seat in &self.seats {
            match frame.crop(&seat.roi) {
                Ok(crop) => {
                    crops.insert(seat.id.clone(), crop);
                }
                Err(e) => {
                    if self.warned.insert(seat.id.clone()) {
                        warn!("Skipping {}: {}", seat.id, e);
                    } else {
                        debug!("Skipping {}: {}", seat.id, e);
                    }
                }
            }
        }
        crops
    }

    /// One pass: capture, crop, and check all seats concurrently
    pub async fn run_cycle(&mut self) -> Result<CycleStats, CaptureError> {
        let frame = self.capture().await?;
        let started = Instant::now();

        self.cycle_index += 1;
        let mut cycle = CycleStats::begin(self.cycle_index);

        let crops = self.crop_seats(&frame);
        cycle.skipped = (self.seats.len() - crops.len()) as u32;

        let now = Instant::now().into_std();
        let MonitorCore {
            monitor, registry, ..
        } = &mut self.core;
        let monitor: &TargetMonitor<D, N> = monitor;

        let checks = registry.iter_mut().filter_map(|state| {
            let crop = crops.get(state.id())?;
            Some(monitor.check(state, crop, now))
        });
        let reports = join_all(checks).await;

        for report in &reports {
            self.core.stats.record(report);
            cycle.record(report);
        }

        if let Some(writer) = &self.core.debug {
            let threshold = self.core.monitor.thresholds().drowsy_count;
            let overlay: Vec<_> = self
                .seats
                .iter()
                .map(|seat| (seat.roi, seat_color(self.core.registry.get(&seat.id), threshold)))
                .collect();
            writer.write_overlay(&frame, &overlay);
        }

        cycle.duration_secs = started.elapsed().as_secs_f64();
        Ok(self.core.end_cycle(cycle))
    }

    /// Run until shutdown; returns the final snapshot
    pub async fn run(mut self, mut shutdown: Shutdown) -> StatsSnapshot {
        info!(
            "ROI monitoring started: {} seats, every {:?}",
            self.seats.len(),
            self.timing.cycle_interval
        );

        while !shutdown.is_triggered() {
            let started = Instant::now();
            let pause = match self.run_cycle().await {
                Ok(_) => self.timing.cycle_interval.saturating_sub(started.elapsed()),
                Err(e) => {
                    warn!(
                        "Frame capture failed: {}; retrying in {:?}",
                        e, self.timing.capture_retry_delay
                    );
                    self.timing.capture_retry_delay
                }
            };
            if !shutdown.sleep(pause).await {
                break;
            }
        }

        self.core.finish()
    }
}
