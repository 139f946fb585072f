//! Frame Capture Library for SeatWatch
//!
//! Provides the image side of the monitoring loop:
//! - Composite frame capture from a snapshot file or an external grabber command
//! - Seat regions (ROI) cropped out of a composite frame
//! - Channel switching for viewers that only show one feed at a time

pub mod frame;
pub mod source;
pub mod switcher;

pub use frame::{Frame, Roi};
pub use source::{CaptureSpec, FrameSource, SnapshotSource};
pub use switcher::{ChannelSwitcher, CommandSwitcher};

use thiserror::Error;

/// Capture error types
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to read frame: {0}")]
    Io(String),

    #[error("Failed to decode frame: {0}")]
    Decode(String),

    #[error("Region {roi} exceeds frame bounds {width}x{height}")]
    OutOfBounds { roi: Roi, width: u32, height: u32 },

    #[error("Region {0} is empty")]
    EmptyRegion(Roi),

    #[error("Invalid channel {channel} (1..={total})")]
    InvalidChannel { channel: u32, total: u32 },

    #[error("No button position configured for channel {0}")]
    MissingButton(u32),

    #[error("Capture command failed: {0}")]
    Command(String),

    #[error("Capture timeout")]
    Timeout,
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Io(err.to_string())
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::Decode(err.to_string())
    }
}

/// Expand `{name}` placeholders in a command argument list
pub(crate) fn expand_args(args: &[String], vars: &[(&str, String)]) -> Vec<String> {
    args.iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |acc, (name, value)| {
                acc.replace(&format!("{{{}}}", name), value)
            })
        })
        .collect()
}
