//! Drowsiness Detector
//!
//! The detector port of the monitoring loop. Perception (face landmark
//! extraction) is delegated to a [`LandmarkProvider`]; this crate turns
//! landmarks into a drowsiness assessment:
//! - Eye aspect ratio (eye closure)
//! - Head tilt ratio (lowered head)
//! - Combined drowsy/confidence decision

pub mod classifier;
pub mod config;
pub mod detection;
pub mod landmarks;
pub mod provider;

pub use classifier::LandmarkClassifier;
pub use config::DetectorConfig;
pub use detection::{Assessment, Detection, DrowsinessMetrics};
pub use landmarks::{FaceLandmarks, Point};
pub use provider::{LandmarkDetector, LandmarkProvider, RemoteLandmarkProvider};

use std::future::Future;

use frame_capture::Frame;
use thiserror::Error;

/// Detector error types
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Landmark request failed: {0}")]
    Request(String),

    #[error("Invalid landmark response: {0}")]
    InvalidResponse(String),

    #[error("Image encoding failed: {0}")]
    ImageEncoding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Detection timeout")]
    Timeout,
}

impl From<reqwest::Error> for DetectorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DetectorError::Timeout
        } else {
            DetectorError::Request(err.to_string())
        }
    }
}

/// Detector port: one target image in, one detection out
pub trait Detector {
    /// Assess a single target image
    fn detect(&self, frame: &Frame) -> impl Future<Output = Result<Detection, DetectorError>> + Send;
}
