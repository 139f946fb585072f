//! Debug frame dumps

use std::path::{Path, PathBuf};

use frame_capture::{Frame, Roi};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use tracing::{debug, warn};

use crate::target::{TargetId, TargetState};

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const ORANGE: Rgb<u8> = Rgb([255, 165, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const GRAY: Rgb<u8> = Rgb([128, 128, 128]);

/// Rectangle color for a target: gray when empty, green when awake,
/// orange while drowsy, red at the alert threshold
pub fn seat_color(state: Option<&TargetState>, drowsy_threshold: u32) -> Rgb<u8> {
    match state {
        None => GRAY,
        Some(s) if !s.is_occupied() => GRAY,
        Some(s) if s.drowsy_counter() >= drowsy_threshold => RED,
        Some(s) if s.drowsy_counter() > 0 => ORANGE,
        Some(_) => GREEN,
    }
}

/// Draws a 2px rectangle outline
pub fn draw_seat(image: &mut RgbImage, roi: &Roi, color: Rgb<u8>) {
    for inset in 0..2u32 {
        if roi.width <= inset * 2 || roi.height <= inset * 2 {
            break;
        }
        let rect = Rect::at((roi.x + inset) as i32, (roi.y + inset) as i32)
            .of_size(roi.width - inset * 2, roi.height - inset * 2);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Writes annotated frames to a directory
#[derive(Debug, Clone)]
pub struct DebugWriter {
    dir: PathBuf,
}

impl DebugWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn save(&self, image: &RgbImage, name: &str) -> Option<PathBuf> {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            warn!("Cannot create debug directory {}: {}", self.dir.display(), e);
            return None;
        }
        let path = self.dir.join(name);
        match image.save(&path) {
            Ok(()) => {
                debug!("Wrote debug frame {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Cannot write debug frame {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Composite frame with every seat outlined
    pub fn write_overlay(&self, frame: &Frame, seats: &[(Roi, Rgb<u8>)]) -> Option<PathBuf> {
        let mut image = frame.image.clone();
        for (roi, color) in seats {
            draw_seat(&mut image, roi, *color);
        }
        self.save(&image, &format!("frame_{:06}.png", frame.sequence))
    }

    /// One channel capture, named after its label
    pub fn write_channel(&self, frame: &Frame, id: &TargetId) -> Option<PathBuf> {
        let name = format!("{}_{}.png", id, frame.captured_at.format("%Y%m%d_%H%M%S"));
        self.save(&frame.image, &name)
    }
}
