//! Detector configuration

use serde::{Deserialize, Serialize};

/// Detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Eye aspect ratio below which the eyes count as closed
    pub ear_threshold: f32,

    /// Head tilt ratio above which the head counts as lowered
    pub head_tilt_threshold: f32,

    /// Confidence when both eyes are closed and the head is down
    pub combined_confidence: f32,

    /// Confidence when only the head is down
    pub head_down_confidence: f32,

    /// Confidence when only the eyes are closed (could be a blink)
    pub eyes_closed_confidence: f32,

    /// Landmark service endpoint
    pub landmark_endpoint: Option<String>,

    /// Per-request timeout (seconds)
    pub timeout_secs: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            ear_threshold: 0.2,
            head_tilt_threshold: 0.58,
            combined_confidence: 0.95,
            head_down_confidence: 0.80,
            eyes_closed_confidence: 0.60,
            landmark_endpoint: None,
            timeout_secs: 5.0,
        }
    }
}

impl DetectorConfig {
    /// Create strict config (flags drowsiness earlier)
    pub fn strict() -> Self {
        Self {
            ear_threshold: 0.23,
            head_tilt_threshold: 0.55,
            ..Default::default()
        }
    }

    /// Create lenient config (flags drowsiness later)
    pub fn lenient() -> Self {
        Self {
            ear_threshold: 0.17,
            head_tilt_threshold: 0.62,
            ..Default::default()
        }
    }
}
