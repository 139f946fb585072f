//! Sequential channel-switching driver

use std::time::Duration;

use alerting::Notifier;
use detector::Detector;
use frame_capture::{CaptureError, ChannelSwitcher, Frame, FrameSource};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{MonitorCore, Shutdown};
use crate::config::{ScheduleSettings, SequentialSettings};
use crate::stats::{CycleStats, StatsSnapshot};
use crate::target::{TargetId, Transition};

/// Sequential loop timing
#[derive(Debug, Clone, Copy)]
pub struct SequentialTiming {
    /// Wait after switching for the viewer to redraw
    pub settle_delay: Duration,
    /// Extra wait right before capturing
    pub pre_capture_delay: Duration,
    /// Target period of one full sweep
    pub full_cycle_period: Duration,
    /// Minimum pause between sweeps
    pub min_cycle_pause: Duration,
    pub capture_timeout: Duration,
}

impl Default for SequentialTiming {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(1200),
            pre_capture_delay: Duration::from_millis(300),
            full_cycle_period: Duration::from_secs(60),
            min_cycle_pause: Duration::from_secs(5),
            capture_timeout: Duration::from_secs(10),
        }
    }
}

impl SequentialTiming {
    pub fn from_settings(schedule: &ScheduleSettings, sequential: &SequentialSettings) -> Self {
        Self {
            settle_delay: sequential.settle_delay(),
            pre_capture_delay: sequential.pre_capture_delay(),
            full_cycle_period: schedule.full_cycle_period(),
            min_cycle_pause: schedule.min_cycle_pause(),
            capture_timeout: schedule.capture_timeout(),
        }
    }

    /// Pause after a sweep that took `elapsed`
    pub fn pause_after(&self, elapsed: Duration) -> Duration {
        self.full_cycle_period
            .saturating_sub(elapsed)
            .max(self.min_cycle_pause)
    }
}

/// Visits channels 1..=N one at a time
pub struct SequentialScheduler<W, S, D, N> {
    core: MonitorCore<D, N>,
    switcher: W,
    source: S,
    timing: SequentialTiming,
    cycle_index: u64,
}

impl<W, S, D, N> SequentialScheduler<W, S, D, N>
where
    W: ChannelSwitcher,
    S: FrameSource,
    D: Detector,
    N: Notifier,
{
    pub fn new(mut core: MonitorCore<D, N>, switcher: W, source: S, timing: SequentialTiming) -> Self {
        for channel in 1..=switcher.total_channels() {
            core.registry.get_or_insert(&TargetId::channel(channel));
        }
        Self {
            core,
            switcher,
            source,
            timing,
            cycle_index: 0,
        }
    }

    pub fn core(&self) -> &MonitorCore<D, N> {
        &self.core
    }

    /// Switch to a channel, let it settle, and grab it
    async fn sample_channel(&mut self, channel: u32) -> Result<Frame, CaptureError> {
        tokio::time::timeout(self.timing.capture_timeout, self.switcher.switch_to(channel))
            .await
            .map_err(|_| CaptureError::Timeout)??;

        tokio::time::sleep(self.timing.settle_delay).await;
        tokio::time::sleep(self.timing.pre_capture_delay).await;

        tokio::time::timeout(self.timing.capture_timeout, self.source.capture())
            .await
            .map_err(|_| CaptureError::Timeout)?
    }

    /// One sweep over every channel, strictly in order
    pub async fn run_cycle(&mut self, shutdown: &Shutdown) -> CycleStats {
        let started = Instant::now();
        self.cycle_index += 1;
        let mut cycle = CycleStats::begin(self.cycle_index);
        let total = self.switcher.total_channels();

        info!("Sweep {} over {} channels", self.cycle_index, total);

        for channel in 1..=total {
            if shutdown.is_triggered() {
                debug!("Shutdown requested, stopping sweep at channel {}", channel);
                break;
            }

            let id = TargetId::channel(channel);
            let frame = match self.sample_channel(channel).await {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("{}: skipped ({})", id, e);
                    cycle.skipped += 1;
                    continue;
                }
            };

            if let Some(writer) = &self.core.debug {
                writer.write_channel(&frame, &id);
            }

            let now = Instant::now().into_std();
            let state = self.core.registry.get_or_insert(&id);
            let report = self.core.monitor.check(state, &frame, now).await;

            match report.transition {
                Transition::Vacated => debug!("{}: empty", id),
                Transition::Steady => debug!("{}: awake", id),
                Transition::Accumulating | Transition::AlertDue { .. } => info!(
                    "{}: drowsy ({}/{})",
                    id,
                    report.drowsy_counter,
                    self.core.monitor.thresholds().drowsy_count
                ),
            }

            self.core.stats.record(&report);
            cycle.record(&report);
        }

        cycle.duration_secs = started.elapsed().as_secs_f64();
        self.core.end_cycle(cycle)
    }

    /// Run until shutdown; returns the final snapshot
    pub async fn run(mut self, mut shutdown: Shutdown) -> StatsSnapshot {
        info!(
            "Sequential monitoring started: {} channels, sweep period {:?}",
            self.switcher.total_channels(),
            self.timing.full_cycle_period
        );

        while !shutdown.is_triggered() {
            let started = Instant::now();
            self.run_cycle(&shutdown).await;

            let pause = self.timing.pause_after(started.elapsed());
            debug!("Next sweep in {:?}", pause);
            if !shutdown.sleep(pause).await {
                break;
            }
        }

        self.core.finish()
    }
}
