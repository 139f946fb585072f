//! Frame sources

use std::future::Future;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::{expand_args, CaptureError, Frame, Roi};

/// Anything that can produce a full frame on demand
pub trait FrameSource {
    /// Capture one frame
    fn capture(&mut self) -> impl Future<Output = Result<Frame, CaptureError>> + Send;
}

/// Capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSpec {
    /// Snapshot file the frame is read from
    pub path: PathBuf,
    /// Optional grabber command run before each read; `{output}` expands to `path`
    pub command: Option<Vec<String>>,
    /// Optional sub-region of the snapshot to keep
    pub region: Option<Roi>,
}

impl Default for CaptureSpec {
    fn default() -> Self {
        Self {
            path: PathBuf::from("capture/screen.png"),
            command: None,
            region: None,
        }
    }
}

impl CaptureSpec {
    /// Read an existing snapshot file
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// Frame source backed by a snapshot file, optionally refreshed by a command
pub struct SnapshotSource {
    spec: CaptureSpec,
    sequence: u64,
}

impl SnapshotSource {
    pub fn new(spec: CaptureSpec) -> Result<Self, CaptureError> {
        if let Some(command) = &spec.command {
            if command.is_empty() {
                return Err(CaptureError::Command("empty capture command".into()));
            }
        }
        if let Some(region) = &spec.region {
            if region.is_empty() {
                return Err(CaptureError::EmptyRegion(*region));
            }
        }
        Ok(Self { spec, sequence: 0 })
    }

    pub fn spec(&self) -> &CaptureSpec {
        &self.spec
    }

    async fn refresh(&self) -> Result<(), CaptureError> {
        let Some(command) = &self.spec.command else {
            return Ok(());
        };

        let output = self.spec.path.display().to_string();
        let args = expand_args(&command[1..], &[("output", output)]);
        debug!("Running capture command: {} {:?}", command[0], args);

        let status = Command::new(&command[0])
            .args(&args)
            .kill_on_drop(true)
            .status()
            .await?;

        if !status.success() {
            return Err(CaptureError::Command(format!("{} exited with {}", command[0], status)));
        }
        Ok(())
    }
}

impl FrameSource for SnapshotSource {
    async fn capture(&mut self) -> Result<Frame, CaptureError> {
        self.refresh().await?;

        let bytes = tokio::fs::read(&self.spec.path).await?;
        let image = image::load_from_memory(&bytes)?.to_rgb8();

        self.sequence += 1;
        let frame = Frame::new(image, self.sequence);

        match &self.spec.region {
            Some(region) => frame.crop(region),
            None => Ok(frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_png(dir: &tempfile::TempDir, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.path().join(name);
        RgbImage::from_pixel(width, height, Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();
        path
    }

    #[tokio::test]
    async fn test_snapshot_file_capture() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(&dir, "screen.png", 64, 48);

        let mut source = SnapshotSource::new(CaptureSpec::file(&path)).unwrap();
        let first = source.capture().await.unwrap();
        let second = source.capture().await.unwrap();

        assert_eq!((first.width(), first.height()), (64, 48));
        assert_eq!(first.image.get_pixel(5, 5), &Rgb([10, 20, 30]));
        assert_eq!(second.sequence, first.sequence + 1);
    }

    #[tokio::test]
    async fn test_capture_region_applied() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(&dir, "screen.png", 64, 48);

        let spec = CaptureSpec {
            region: Some(Roi::new(8, 8, 16, 12)),
            ..CaptureSpec::file(&path)
        };
        let frame = SnapshotSource::new(spec).unwrap().capture().await.unwrap();
        assert_eq!((frame.width(), frame.height()), (16, 12));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let mut source = SnapshotSource::new(CaptureSpec::file("/nonexistent/screen.png")).unwrap();
        assert!(matches!(source.capture().await, Err(CaptureError::Io(_))));
    }

    #[test]
    fn test_empty_command_rejected() {
        let spec = CaptureSpec {
            command: Some(vec![]),
            ..Default::default()
        };
        assert!(SnapshotSource::new(spec).is_err());
    }
}
