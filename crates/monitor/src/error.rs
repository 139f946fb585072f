//! Monitor error types

use alerting::AlertError;
use detector::DetectorError;
use frame_capture::CaptureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No targets configured for {0} mode")]
    NoTargets(&'static str),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("Alerting error: {0}")]
    Alert(#[from] AlertError),

    #[error("Stats export failed: {0}")]
    Export(String),

    #[error("Metrics exporter failed: {0}")]
    Metrics(String),
}

impl From<config::ConfigError> for MonitorError {
    fn from(err: config::ConfigError) -> Self {
        MonitorError::Config(err.to_string())
    }
}
