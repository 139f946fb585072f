//! Facial landmark geometry

use serde::{Deserialize, Serialize};

/// Landmark position, normalized to the image (0-1 on both axes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Scale to pixel coordinates
    pub fn to_pixels(self, width: u32, height: u32) -> Point {
        Point::new(self.x * width as f32, self.y * height as f32)
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Landmarks needed for the drowsiness assessment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    /// Six eye contour points: outer corner, two upper lid, inner corner, two lower lid
    pub left_eye: [Point; 6],
    pub right_eye: [Point; 6],
    pub nose_tip: Point,
    pub chin: Point,
    pub forehead: Point,
}

impl FaceLandmarks {
    /// Copy with every point scaled to pixel coordinates
    pub fn to_pixels(&self, width: u32, height: u32) -> FaceLandmarks {
        let scale = |p: Point| p.to_pixels(width, height);
        FaceLandmarks {
            left_eye: self.left_eye.map(scale),
            right_eye: self.right_eye.map(scale),
            nose_tip: scale(self.nose_tip),
            chin: scale(self.chin),
            forehead: scale(self.forehead),
        }
    }
}

/// Eye aspect ratio. Open eyes sit around 0.25-0.3, closed below 0.2.
///
/// Returns 0 for a degenerate eye with no horizontal extent.
pub fn eye_aspect_ratio(eye: &[Point; 6]) -> f32 {
    let vertical_a = eye[1].distance(&eye[5]);
    let vertical_b = eye[2].distance(&eye[4]);
    let horizontal = eye[0].distance(&eye[3]);

    if horizontal <= f32::EPSILON {
        return 0.0;
    }
    (vertical_a + vertical_b) / (2.0 * horizontal)
}

/// Position of the nose between forehead and chin. Around 0.5 upright,
/// above ~0.58 with the head lowered. Degenerate faces report 0.5.
pub fn head_tilt_ratio(nose_tip: &Point, chin: &Point, forehead: &Point) -> f32 {
    let span = chin.y - forehead.y;
    if span.abs() <= f32::EPSILON {
        return 0.5;
    }
    (nose_tip.y - forehead.y) / span
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn eye(openness: f32) -> [Point; 6] {
        [
            Point::new(0.0, 0.0),
            Point::new(1.0, -openness),
            Point::new(2.0, -openness),
            Point::new(3.0, 0.0),
            Point::new(2.0, openness),
            Point::new(1.0, openness),
        ]
    }

    #[test]
    fn test_ear_open_and_closed() {
        // vertical distances 2*openness, horizontal 3
        let open = eye_aspect_ratio(&eye(0.45));
        assert!((open - 0.3).abs() < 1e-5);

        let closed = eye_aspect_ratio(&eye(0.15));
        assert!((closed - 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_ear_degenerate_eye() {
        let eye = [Point::default(); 6];
        assert_eq!(eye_aspect_ratio(&eye), 0.0);
    }

    #[test]
    fn test_head_tilt() {
        let forehead = Point::new(0.5, 0.2);
        let chin = Point::new(0.5, 0.8);

        let upright = head_tilt_ratio(&Point::new(0.5, 0.5), &chin, &forehead);
        assert!((upright - 0.5).abs() < 1e-5);

        let lowered = head_tilt_ratio(&Point::new(0.5, 0.6), &chin, &forehead);
        assert!(lowered > 0.58);

        let flat = head_tilt_ratio(&Point::new(0.5, 0.6), &forehead, &forehead);
        assert_eq!(flat, 0.5);
    }

    #[test]
    fn test_to_pixels() {
        let p = Point::new(0.5, 0.25).to_pixels(640, 480);
        assert_eq!(p, Point::new(320.0, 120.0));
    }

    proptest! {
        #[test]
        fn prop_ear_ignores_scale_and_offset(
            openness in 0.0f32..1.0,
            scale in 0.5f32..100.0,
            dx in -100.0f32..100.0,
            dy in -100.0f32..100.0,
        ) {
            let base = eye(openness);
            let moved = base.map(|p| Point::new(p.x * scale + dx, p.y * scale + dy));
            let expected = eye_aspect_ratio(&base);
            prop_assert!((eye_aspect_ratio(&moved) - expected).abs() < 1e-3);
            prop_assert!((expected - 2.0 * openness / 3.0).abs() < 1e-4);
        }

        #[test]
        fn prop_head_tilt_tracks_nose_position(
            forehead_y in 0.0f32..0.4,
            chin_y in 0.6f32..1.0,
            t in 0.0f32..=1.0,
        ) {
            let nose = Point::new(0.5, forehead_y + t * (chin_y - forehead_y));
            let chin = Point::new(0.5, chin_y);
            let forehead = Point::new(0.5, forehead_y);
            let ratio = head_tilt_ratio(&nose, &chin, &forehead);
            prop_assert!((ratio - t).abs() < 1e-4);
        }
    }
}
