//! Detection results

use serde::{Deserialize, Serialize};

/// Per-sample drowsiness measurements
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DrowsinessMetrics {
    /// Average eye aspect ratio of both eyes
    pub ear: f32,
    pub left_ear: f32,
    pub right_ear: f32,
    /// Nose position between forehead (0) and chin (1)
    pub head_tilt: f32,
    pub eyes_closed: bool,
    pub head_down: bool,
}

/// Drowsiness assessment of a recognized subject
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub is_drowsy: bool,
    /// Confidence of the drowsy call (0-1)
    pub confidence: f32,
    pub metrics: DrowsinessMetrics,
}

/// Detector output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Detection {
    /// A face was found and assessed
    Subject(Assessment),
    /// No face in the image
    NoSubject,
}

impl Detection {
    pub fn has_subject(&self) -> bool {
        matches!(self, Detection::Subject(_))
    }

    pub fn assessment(&self) -> Option<&Assessment> {
        match self {
            Detection::Subject(a) => Some(a),
            Detection::NoSubject => None,
        }
    }
}
