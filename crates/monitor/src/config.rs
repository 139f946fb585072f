//! Monitor settings
//!
//! Layered from defaults, an optional settings file, and `SEATWATCH__*`
//! environment overrides (e.g. `SEATWATCH__DETECTION__DROWSY_THRESHOLD=3`).

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use alerting::{AlertConfig, NotifierConfig};
use config::{Config, Environment, File};
use detector::DetectorConfig;
use frame_capture::{CaptureSpec, Roi};
use occupancy::OccupancyConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::logging::LogFormat;
use crate::target::{ResetPolicy, TargetId, Thresholds};
use crate::MonitorError;

/// Settings file read when none is given on the command line
pub const DEFAULT_SETTINGS_PATH: &str = "config/settings.toml";

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

/// Reject a duration setting that is negative, NaN or infinite
fn check_secs(name: &str, value: f64) -> Result<(), MonitorError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(MonitorError::Config(format!(
            "{} must be a finite, non-negative number of seconds, got {}",
            name, value
        )))
    }
}

/// Sampling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// All seats cropped from one composite frame, checked concurrently
    #[default]
    Roi,
    /// One channel at a time through a viewer switch
    Sequential,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Roi => "roi",
            Mode::Sequential => "sequential",
        }
    }
}

/// Detection and hysteresis settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    pub confidence_threshold: f32,
    pub drowsy_threshold: u32,
    pub alert_cooldown_secs: f64,
    pub alert_reset: ResetPolicy,
    pub ear_threshold: f32,
    pub head_tilt_threshold: f32,
    pub detector_timeout_secs: f64,
    pub landmark_endpoint: Option<String>,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.75,
            drowsy_threshold: 5,
            alert_cooldown_secs: 300.0,
            alert_reset: ResetPolicy::OnAttempt,
            ear_threshold: 0.2,
            head_tilt_threshold: 0.58,
            detector_timeout_secs: 5.0,
            landmark_endpoint: None,
        }
    }
}

impl DetectionSettings {
    /// Quicker to alert, more false positives
    pub fn strict() -> Self {
        Self {
            confidence_threshold: 0.6,
            drowsy_threshold: 3,
            ear_threshold: 0.23,
            head_tilt_threshold: 0.55,
            ..Default::default()
        }
    }

    /// Slower to alert, fewer false positives
    pub fn lenient() -> Self {
        Self {
            confidence_threshold: 0.85,
            drowsy_threshold: 8,
            ear_threshold: 0.17,
            head_tilt_threshold: 0.62,
            ..Default::default()
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            confidence: self.confidence_threshold,
            drowsy_count: self.drowsy_threshold,
            reset: self.alert_reset,
        }
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            ear_threshold: self.ear_threshold,
            head_tilt_threshold: self.head_tilt_threshold,
            landmark_endpoint: self.landmark_endpoint.clone(),
            timeout_secs: self.detector_timeout_secs,
            ..Default::default()
        }
    }

    pub fn detector_timeout(&self) -> Duration {
        secs(self.detector_timeout_secs)
    }
}

/// Loop timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub mode: Mode,
    /// ROI mode: target period of one pass
    pub cycle_interval_secs: f64,
    /// Sequential mode: target period of one full sweep
    pub full_cycle_period_secs: f64,
    /// Sequential mode: minimum pause between sweeps
    pub min_cycle_pause_secs: f64,
    pub capture_retry_delay_secs: f64,
    pub capture_timeout_secs: f64,
    pub summary_interval_secs: f64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            mode: Mode::Roi,
            cycle_interval_secs: 2.0,
            full_cycle_period_secs: 60.0,
            min_cycle_pause_secs: 5.0,
            capture_retry_delay_secs: 5.0,
            capture_timeout_secs: 10.0,
            summary_interval_secs: 300.0,
        }
    }
}

impl ScheduleSettings {
    pub fn cycle_interval(&self) -> Duration {
        secs(self.cycle_interval_secs)
    }

    pub fn full_cycle_period(&self) -> Duration {
        secs(self.full_cycle_period_secs)
    }

    pub fn min_cycle_pause(&self) -> Duration {
        secs(self.min_cycle_pause_secs)
    }

    pub fn capture_retry_delay(&self) -> Duration {
        secs(self.capture_retry_delay_secs)
    }

    pub fn capture_timeout(&self) -> Duration {
        secs(self.capture_timeout_secs)
    }

    pub fn summary_interval(&self) -> Duration {
        secs(self.summary_interval_secs)
    }
}

/// One seat region of the composite frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatSettings {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Viewer channel showing this seat, informational
    #[serde(default)]
    pub channel: Option<u32>,
}

fn default_enabled() -> bool {
    true
}

impl SeatSettings {
    pub fn roi(&self) -> Roi {
        Roi::new(self.x, self.y, self.width, self.height)
    }
}

/// ROI mode settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiSettings {
    pub source: CaptureSpec,
    pub seats: BTreeMap<String, SeatSettings>,
}

impl RoiSettings {
    /// Enabled seats in id order
    pub fn enabled_seats(&self) -> Vec<(TargetId, Roi)> {
        self.seats
            .iter()
            .filter(|(_, seat)| seat.enabled)
            .map(|(id, seat)| (TargetId::new(id.as_str()), seat.roi()))
            .collect()
    }
}

/// Sequential mode settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequentialSettings {
    pub total_channels: u32,
    pub settle_delay_secs: f64,
    pub pre_capture_delay_secs: f64,
    /// Command with `{channel}`, `{x}`, `{y}` placeholders
    pub switch_command: Vec<String>,
    pub capture: CaptureSpec,
    /// Channel number -> button position
    pub buttons: BTreeMap<String, [i32; 2]>,
}

impl Default for SequentialSettings {
    fn default() -> Self {
        Self {
            total_channels: 16,
            settle_delay_secs: 1.2,
            pre_capture_delay_secs: 0.3,
            switch_command: ["xdotool", "mousemove", "{x}", "{y}", "click", "1"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            capture: CaptureSpec::default(),
            buttons: BTreeMap::new(),
        }
    }
}

impl SequentialSettings {
    pub fn settle_delay(&self) -> Duration {
        secs(self.settle_delay_secs)
    }

    pub fn pre_capture_delay(&self) -> Duration {
        secs(self.pre_capture_delay_secs)
    }

    /// Button positions keyed by channel number
    pub fn button_map(&self) -> Result<HashMap<u32, (i32, i32)>, MonitorError> {
        self.buttons
            .iter()
            .map(|(key, [x, y])| {
                key.trim()
                    .parse::<u32>()
                    .map(|channel| (channel, (*x, *y)))
                    .map_err(|_| MonitorError::Config(format!("invalid channel key '{}'", key)))
            })
            .collect()
    }
}

/// Output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub log_format: LogFormat,
    /// Annotated frames are written here in debug mode
    pub debug_dir: PathBuf,
    /// Snapshot JSON written after every summary
    pub stats_export_path: Option<PathBuf>,
    /// Prometheus scrape endpoint
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Plain,
            debug_dir: PathBuf::from("debug"),
            stats_export_path: None,
            metrics_addr: None,
        }
    }
}

/// All monitor settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub detection: DetectionSettings,
    pub occupancy: OccupancyConfig,
    pub schedule: ScheduleSettings,
    pub roi: RoiSettings,
    pub sequential: SequentialSettings,
    pub notifier: NotifierConfig,
    pub output: OutputSettings,
    /// Write debug overlays
    #[serde(skip)]
    pub debug: bool,
    /// File the settings were read from; `None` when running on defaults
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Settings {
    /// Load settings. An explicit `path` must exist; without one the default
    /// path is read if present.
    pub fn load(path: Option<&Path>) -> Result<Self, MonitorError> {
        Self::load_with_fallback(path, Path::new(DEFAULT_SETTINGS_PATH))
    }

    /// Like [`Settings::load`], reading `fallback` when no path is given.
    /// Check [`Settings::source`] to see whether a file was found.
    pub fn load_with_fallback(
        path: Option<&Path>,
        fallback: &Path,
    ) -> Result<Self, MonitorError> {
        let source = match path {
            Some(path) => Some(path.to_path_buf()),
            None => fallback.exists().then(|| fallback.to_path_buf()),
        };

        let mut builder = Config::builder();
        if let Some(file) = &source {
            builder = builder.add_source(File::from(file.as_path()).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("SEATWATCH")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.source = source;
        Ok(settings)
    }

    pub fn alert_config(&self) -> AlertConfig {
        AlertConfig {
            cooldown_seconds: self.detection.alert_cooldown_secs,
            send_timeout_secs: self.notifier.timeout_secs,
            ..Default::default()
        }
    }

    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> Result<(), MonitorError> {
        let detection = &self.detection;
        if !(0.0..=1.0).contains(&detection.confidence_threshold) {
            return Err(MonitorError::Config(format!(
                "confidence_threshold {} outside 0..=1",
                detection.confidence_threshold
            )));
        }
        if detection.drowsy_threshold == 0 {
            return Err(MonitorError::Config("drowsy_threshold must be at least 1".into()));
        }
        check_secs("alert_cooldown_secs", detection.alert_cooldown_secs)?;
        check_secs("detector_timeout_secs", detection.detector_timeout_secs)?;
        if detection.detector_timeout_secs == 0.0 {
            return Err(MonitorError::Config("detector_timeout_secs must be positive".into()));
        }

        let schedule = &self.schedule;
        for (name, value) in [
            ("cycle_interval_secs", schedule.cycle_interval_secs),
            ("full_cycle_period_secs", schedule.full_cycle_period_secs),
            ("min_cycle_pause_secs", schedule.min_cycle_pause_secs),
            ("capture_retry_delay_secs", schedule.capture_retry_delay_secs),
            ("capture_timeout_secs", schedule.capture_timeout_secs),
            ("summary_interval_secs", schedule.summary_interval_secs),
            ("settle_delay_secs", self.sequential.settle_delay_secs),
            ("pre_capture_delay_secs", self.sequential.pre_capture_delay_secs),
            ("notifier.timeout_secs", self.notifier.timeout_secs),
        ] {
            check_secs(name, value)?;
        }

        match self.schedule.mode {
            Mode::Roi => {
                if self.roi.enabled_seats().is_empty() {
                    return Err(MonitorError::NoTargets(Mode::Roi.as_str()));
                }
                if let Some((id, _)) = self
                    .roi
                    .enabled_seats()
                    .into_iter()
                    .find(|(_, roi)| roi.is_empty())
                {
                    return Err(MonitorError::Config(format!("seat {} has an empty region", id)));
                }
            }
            Mode::Sequential => {
                if self.sequential.total_channels == 0 {
                    return Err(MonitorError::NoTargets(Mode::Sequential.as_str()));
                }
                if self.sequential.switch_command.is_empty() {
                    return Err(MonitorError::Config("switch_command is empty".into()));
                }
                let buttons = self.sequential.button_map()?;
                let missing: Vec<u32> = (1..=self.sequential.total_channels)
                    .filter(|c| !buttons.contains_key(c))
                    .collect();
                if !missing.is_empty() {
                    warn!("No button position for channels {:?}; they will be skipped", missing);
                }
            }
        }

        Ok(())
    }
}
