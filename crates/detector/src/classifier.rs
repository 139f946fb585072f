//! Landmark-based drowsiness classification

use tracing::debug;

use crate::landmarks::{eye_aspect_ratio, head_tilt_ratio};
use crate::{Assessment, DetectorConfig, DrowsinessMetrics, FaceLandmarks};

/// Turns face landmarks into a drowsiness assessment.
///
/// A lowered head is the stronger signal; closed eyes alone may be a blink.
pub struct LandmarkClassifier {
    config: DetectorConfig,
}

impl LandmarkClassifier {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Classify normalized landmarks from a `width` x `height` image
    pub fn classify(&self, landmarks: &FaceLandmarks, width: u32, height: u32) -> Assessment {
        let px = landmarks.to_pixels(width, height);

        let left_ear = eye_aspect_ratio(&px.left_eye);
        let right_ear = eye_aspect_ratio(&px.right_eye);
        let ear = (left_ear + right_ear) / 2.0;
        let head_tilt = head_tilt_ratio(&px.nose_tip, &px.chin, &px.forehead);

        let eyes_closed = ear < self.config.ear_threshold;
        let head_down = head_tilt > self.config.head_tilt_threshold;

        let (is_drowsy, confidence) = match (eyes_closed, head_down) {
            (true, true) => (true, self.config.combined_confidence),
            (false, true) => (true, self.config.head_down_confidence),
            (true, false) => (true, self.config.eyes_closed_confidence),
            (false, false) => (false, 0.0),
        };

        debug!(
            "EAR {:.3} (L {:.3} R {:.3}), tilt {:.3} -> drowsy={} ({:.2})",
            ear, left_ear, right_ear, head_tilt, is_drowsy, confidence
        );

        Assessment {
            is_drowsy,
            confidence,
            metrics: DrowsinessMetrics {
                ear,
                left_ear,
                right_ear,
                head_tilt,
                eyes_closed,
                head_down,
            },
        }
    }
}

impl Default for LandmarkClassifier {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point;

    /// Eye centred at (cx, cy), 0.06 wide, with the given EAR
    fn eye(cx: f32, cy: f32, ear: f32) -> [Point; 6] {
        let half_width = 0.03;
        let half_open = ear * half_width;
        [
            Point::new(cx - half_width, cy),
            Point::new(cx - 0.01, cy - half_open),
            Point::new(cx + 0.01, cy - half_open),
            Point::new(cx + half_width, cy),
            Point::new(cx + 0.01, cy + half_open),
            Point::new(cx - 0.01, cy + half_open),
        ]
    }

    fn face(ear: f32, nose_y: f32) -> FaceLandmarks {
        FaceLandmarks {
            left_eye: eye(0.4, 0.4, ear),
            right_eye: eye(0.6, 0.4, ear),
            nose_tip: Point::new(0.5, nose_y),
            chin: Point::new(0.5, 0.8),
            forehead: Point::new(0.5, 0.2),
        }
    }

    // Square image keeps the normalized EAR unchanged
    const SIDE: u32 = 500;

    #[test]
    fn test_alert_subject() {
        let a = LandmarkClassifier::default().classify(&face(0.3, 0.5), SIDE, SIDE);
        assert!(!a.is_drowsy);
        assert_eq!(a.confidence, 0.0);
        assert!((a.metrics.ear - 0.3).abs() < 1e-3);
        assert!((a.metrics.head_tilt - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_combination_table() {
        let classifier = LandmarkClassifier::default();

        let both = classifier.classify(&face(0.1, 0.65), SIDE, SIDE);
        assert!(both.is_drowsy && both.metrics.eyes_closed && both.metrics.head_down);
        assert_eq!(both.confidence, 0.95);

        let head = classifier.classify(&face(0.3, 0.65), SIDE, SIDE);
        assert!(head.is_drowsy && !head.metrics.eyes_closed && head.metrics.head_down);
        assert_eq!(head.confidence, 0.80);

        let eyes = classifier.classify(&face(0.1, 0.5), SIDE, SIDE);
        assert!(eyes.is_drowsy && eyes.metrics.eyes_closed && !eyes.metrics.head_down);
        assert_eq!(eyes.confidence, 0.60);
    }

    #[test]
    fn test_strict_flags_earlier() {
        let borderline = face(0.21, 0.539);
        assert!(!LandmarkClassifier::default().classify(&borderline, SIDE, SIDE).is_drowsy);
        assert!(LandmarkClassifier::new(DetectorConfig::strict())
            .classify(&borderline, SIDE, SIDE)
            .is_drowsy);
    }
}
