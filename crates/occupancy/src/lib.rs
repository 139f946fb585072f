//! Seat Occupancy Heuristics
//!
//! Decides whether a target currently has an occupant. An empty seat is
//! usually a bright, low-texture background; a person adds darker large
//! shapes and plenty of edges. Two interchangeable strategies:
//! - Pixel statistics (mean luminance + Canny edge density) for ROI crops
//! - Detector signal (a face was found) for dedicated channel captures

use detector::Detection;
use frame_capture::Frame;
use imageproc::edges::canny;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Occupancy heuristic configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OccupancyConfig {
    /// Mean luminance must stay below this (0-255)
    pub brightness_threshold: f32,
    /// Edge pixel fraction must exceed this (0-1)
    pub edge_density_threshold: f32,
    /// Canny hysteresis low threshold
    pub canny_low: f32,
    /// Canny hysteresis high threshold
    pub canny_high: f32,
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self {
            brightness_threshold: 180.0,
            edge_density_threshold: 0.05,
            canny_low: 50.0,
            canny_high: 150.0,
        }
    }
}

/// Measurements behind one occupancy decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OccupancyReading {
    /// Mean luminance (0-255)
    pub brightness: f32,
    /// Fraction of pixels on an edge (0-1)
    pub edge_density: f32,
    pub occupied: bool,
}

/// Pixel-statistics occupancy heuristic
#[derive(Debug, Clone, Default)]
pub struct PixelStatistics {
    config: OccupancyConfig,
}

impl PixelStatistics {
    pub fn new(config: OccupancyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OccupancyConfig {
        &self.config
    }

    /// Measure brightness and edge density of a target image
    pub fn measure(&self, frame: &Frame) -> OccupancyReading {
        let gray = frame.to_grayscale();
        let total = gray.width() as usize * gray.height() as usize;
        if total == 0 {
            return OccupancyReading {
                brightness: 0.0,
                edge_density: 0.0,
                occupied: false,
            };
        }

        let sum: u64 = gray.pixels().map(|p| p[0] as u64).sum();
        let brightness = sum as f32 / total as f32;

        let edges = canny(&gray, self.config.canny_low, self.config.canny_high);
        let edge_pixels = edges.pixels().filter(|p| p[0] > 0).count();
        let edge_density = edge_pixels as f32 / total as f32;

        let occupied = brightness < self.config.brightness_threshold
            && edge_density > self.config.edge_density_threshold;

        trace!(
            "brightness {:.1}, edge density {:.4} -> occupied={}",
            brightness, edge_density, occupied
        );

        OccupancyReading {
            brightness,
            edge_density,
            occupied,
        }
    }

    pub fn is_occupied(&self, frame: &Frame) -> bool {
        self.measure(frame).occupied
    }
}

/// Detector-signal occupancy: a recognized face means someone is there
pub fn occupied_by_detection(detection: &Detection) -> bool {
    detection.has_subject()
}

/// Occupancy strategy, selected by sampling mode
#[derive(Debug, Clone)]
pub enum OccupancyStrategy {
    /// Decide from the image before running the detector
    PixelStatistics(PixelStatistics),
    /// Decide from the detector's output
    DetectorSignal,
}

impl OccupancyStrategy {
    pub fn pixel_statistics(config: OccupancyConfig) -> Self {
        OccupancyStrategy::PixelStatistics(PixelStatistics::new(config))
    }
}
