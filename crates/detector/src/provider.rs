//! Landmark providers and the landmark-backed detector

use std::future::Future;
use std::io::Cursor;
use std::time::Duration;

use frame_capture::Frame;
use image::ImageFormat;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{Detection, Detector, DetectorConfig, DetectorError, FaceLandmarks, LandmarkClassifier};

/// Perception backend: finds the face landmarks in one image
pub trait LandmarkProvider {
    /// `Ok(None)` when no face is present
    fn landmarks(
        &self,
        frame: &Frame,
    ) -> impl Future<Output = Result<Option<FaceLandmarks>, DetectorError>> + Send;
}

/// Response body of the landmark service
#[derive(Debug, Deserialize)]
struct LandmarkResponse {
    face: Option<FaceLandmarks>,
}

/// Landmark provider backed by an HTTP face-mesh service.
///
/// The image is posted as PNG; the service answers `{"face": null}` or
/// `{"face": {"left_eye": [...], "right_eye": [...], "nose_tip": ..., "chin": ..., "forehead": ...}}`
/// with coordinates normalized to the image.
pub struct RemoteLandmarkProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteLandmarkProvider {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, DetectorError> {
        let endpoint = endpoint.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DetectorError::Config(e.to_string()))?;

        info!("Using landmark service at {}", endpoint);
        Ok(Self { client, endpoint })
    }

    /// Build from detector config; the endpoint is required
    pub fn from_config(config: &DetectorConfig) -> Result<Self, DetectorError> {
        let endpoint = config
            .landmark_endpoint
            .clone()
            .ok_or_else(|| DetectorError::Config("landmark_endpoint is not set".into()))?;
        let timeout = Duration::try_from_secs_f64(config.timeout_secs)
            .ok()
            .filter(|t| !t.is_zero())
            .ok_or_else(|| {
                DetectorError::Config(format!("invalid timeout_secs {}", config.timeout_secs))
            })?;
        Self::new(endpoint, timeout)
    }
}

/// Encode a frame as PNG
fn encode_png(frame: &Frame) -> Result<Vec<u8>, DetectorError> {
    let mut buf = Cursor::new(Vec::new());
    frame
        .image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| DetectorError::ImageEncoding(e.to_string()))?;
    Ok(buf.into_inner())
}

impl LandmarkProvider for RemoteLandmarkProvider {
    async fn landmarks(&self, frame: &Frame) -> Result<Option<FaceLandmarks>, DetectorError> {
        let body = encode_png(frame)?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectorError::Request(format!("landmark service returned {}", status)));
        }

        let parsed: LandmarkResponse = response
            .json()
            .await
            .map_err(|e| DetectorError::InvalidResponse(e.to_string()))?;
        Ok(parsed.face)
    }
}

/// Detector that classifies landmarks from a provider
pub struct LandmarkDetector<P> {
    provider: P,
    classifier: LandmarkClassifier,
}

impl<P: LandmarkProvider> LandmarkDetector<P> {
    pub fn new(provider: P, classifier: LandmarkClassifier) -> Self {
        Self { provider, classifier }
    }
}

impl<P: LandmarkProvider + Sync> Detector for LandmarkDetector<P> {
    async fn detect(&self, frame: &Frame) -> Result<Detection, DetectorError> {
        match self.provider.landmarks(frame).await? {
            Some(landmarks) => Ok(Detection::Subject(self.classifier.classify(
                &landmarks,
                frame.width(),
                frame.height(),
            ))),
            None => {
                debug!("No face in frame #{}", frame.sequence);
                Ok(Detection::NoSubject)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point;
    use image::{Rgb, RgbImage};

    struct FixedProvider(Option<FaceLandmarks>);

    impl LandmarkProvider for FixedProvider {
        async fn landmarks(&self, _frame: &Frame) -> Result<Option<FaceLandmarks>, DetectorError> {
            Ok(self.0)
        }
    }

    fn frame() -> Frame {
        Frame::new(RgbImage::from_pixel(100, 100, Rgb([0, 0, 0])), 7)
    }

    fn lowered_head() -> FaceLandmarks {
        let eye = |cx: f32| {
            [
                Point::new(cx - 0.03, 0.4),
                Point::new(cx - 0.01, 0.39),
                Point::new(cx + 0.01, 0.39),
                Point::new(cx + 0.03, 0.4),
                Point::new(cx + 0.01, 0.41),
                Point::new(cx - 0.01, 0.41),
            ]
        };
        FaceLandmarks {
            left_eye: eye(0.4),
            right_eye: eye(0.6),
            nose_tip: Point::new(0.5, 0.7),
            chin: Point::new(0.5, 0.8),
            forehead: Point::new(0.5, 0.2),
        }
    }

    #[tokio::test]
    async fn test_no_face_is_no_subject() {
        let detector = LandmarkDetector::new(FixedProvider(None), LandmarkClassifier::default());
        assert_eq!(detector.detect(&frame()).await.unwrap(), Detection::NoSubject);
    }

    #[tokio::test]
    async fn test_face_is_classified() {
        let detector = LandmarkDetector::new(
            FixedProvider(Some(lowered_head())),
            LandmarkClassifier::default(),
        );
        let detection = detector.detect(&frame()).await.unwrap();
        let assessment = detection.assessment().unwrap();
        assert!(assessment.is_drowsy);
        assert!(assessment.metrics.head_down);
    }

    #[test]
    fn test_encode_png_roundtrip_size() {
        let bytes = encode_png(&frame()).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), 100);
    }

    #[test]
    fn test_response_parsing() {
        let empty: LandmarkResponse = serde_json::from_str(r#"{"face": null}"#).unwrap();
        assert!(empty.face.is_none());

        let json = serde_json::to_string(&serde_json::json!({ "face": lowered_head() })).unwrap();
        let parsed: LandmarkResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.face, Some(lowered_head()));
    }

    #[test]
    fn test_missing_endpoint() {
        let result = RemoteLandmarkProvider::from_config(&DetectorConfig::default());
        assert!(matches!(result, Err(DetectorError::Config(_))));
    }

    #[test]
    fn test_invalid_timeout() {
        for timeout_secs in [-1.0, 0.0, f64::INFINITY, f64::NAN] {
            let config = DetectorConfig {
                landmark_endpoint: Some("http://127.0.0.1:8500/landmarks".into()),
                timeout_secs,
                ..Default::default()
            };
            let result = RemoteLandmarkProvider::from_config(&config);
            assert!(matches!(result, Err(DetectorError::Config(_))), "{}", timeout_secs);
        }
    }
}
