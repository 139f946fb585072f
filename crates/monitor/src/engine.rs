//! Target monitor: occupancy, detection and the per-target update

use std::time::{Duration, Instant};

use alerting::{AlertDecision, AlertGate, Notifier};
use chrono::Utc;
use detector::{Detection, Detector};
use frame_capture::Frame;
use occupancy::OccupancyStrategy;
use tracing::{debug, info, warn};

use crate::target::{
    Observation, Sample, TargetId, TargetPhase, TargetState, Thresholds, Transition,
};

/// Outcome of one tick for one target
#[derive(Debug, Clone, PartialEq)]
pub struct TargetReport {
    pub id: TargetId,
    pub transition: Transition,
    /// Set when the threshold was reached this tick
    pub alert: Option<AlertDecision>,
    pub drowsy_counter: u32,
    pub phase: TargetPhase,
}

impl TargetReport {
    pub fn alert_sent(&self) -> bool {
        self.alert.as_ref().is_some_and(|d| d.is_sent())
    }
}

/// Applies the update contract shared by both sampling modes
pub struct TargetMonitor<D, N> {
    detector: D,
    gate: AlertGate<N>,
    occupancy: OccupancyStrategy,
    thresholds: Thresholds,
    detector_timeout: Duration,
}

impl<D: Detector, N: Notifier> TargetMonitor<D, N> {
    pub fn new(
        detector: D,
        gate: AlertGate<N>,
        occupancy: OccupancyStrategy,
        thresholds: Thresholds,
        detector_timeout: Duration,
    ) -> Self {
        Self {
            detector,
            gate,
            occupancy,
            thresholds,
            detector_timeout,
        }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn gate(&self) -> &AlertGate<N> {
        &self.gate
    }

    /// Run the detector with a timeout. Failures count as no subject.
    async fn detect(&self, id: &TargetId, frame: &Frame) -> Detection {
        match tokio::time::timeout(self.detector_timeout, self.detector.detect(frame)).await {
            Ok(Ok(detection)) => detection,
            Ok(Err(e)) => {
                warn!("Detector failed for {}: {}", id, e);
                Detection::NoSubject
            }
            Err(_) => {
                warn!("Detector timed out for {} after {:?}", id, self.detector_timeout);
                Detection::NoSubject
            }
        }
    }

    /// Turn one target image into an observation
    pub async fn assess(&self, id: &TargetId, frame: &Frame) -> Observation {
        let now = Utc::now();
        match &self.occupancy {
            OccupancyStrategy::PixelStatistics(heuristic) => {
                let reading = heuristic.measure(frame);
                debug!(
                    "{}: brightness {:.1}, edge density {:.4}",
                    id, reading.brightness, reading.edge_density
                );
                if !reading.occupied {
                    return Observation::Vacant;
                }
                match self.detect(id, frame).await {
                    Detection::Subject(assessment) => {
                        Observation::Occupied(Sample::from_assessment(&assessment, now))
                    }
                    // Seat looks occupied but no face: count as awake
                    Detection::NoSubject => Observation::Occupied(Sample::alert_free(now)),
                }
            }
            OccupancyStrategy::DetectorSignal => match self.detect(id, frame).await {
                Detection::Subject(assessment) => {
                    Observation::Occupied(Sample::from_assessment(&assessment, now))
                }
                Detection::NoSubject => Observation::Vacant,
            },
        }
    }

    /// Feed one observation into a target, attempting an alert when due
    pub async fn observe(
        &self,
        state: &mut TargetState,
        observation: Observation,
        now: Instant,
    ) -> TargetReport {
        let transition = state.apply(observation, &self.thresholds, Utc::now());

        let alert = match transition {
            Transition::AlertDue { confidence, metrics } => {
                info!(
                    "{} reached drowsy threshold ({}), confidence {:.2}",
                    state.id(),
                    state.drowsy_counter(),
                    confidence
                );
                let id = state.id().clone();
                let decision = self
                    .gate
                    .try_alert(id.as_str(), state.last_alert_mut(), confidence, &metrics, now)
                    .await;
                state.settle_alert(decision.is_sent(), self.thresholds.reset);
                Some(decision)
            }
            Transition::Accumulating => {
                debug!(
                    "{} drowsy ({}/{})",
                    state.id(),
                    state.drowsy_counter(),
                    self.thresholds.drowsy_count
                );
                None
            }
            Transition::Vacated | Transition::Steady => None,
        };

        TargetReport {
            id: state.id().clone(),
            transition,
            alert,
            drowsy_counter: state.drowsy_counter(),
            phase: state.phase(),
        }
    }

    /// Assess an image and feed the result into the target
    pub async fn check(&self, state: &mut TargetState, frame: &Frame, now: Instant) -> TargetReport {
        let observation = self.assess(state.id(), frame).await;
        self.observe(state, observation, now).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Port fakes shared by monitor tests

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use alerting::{AlertError, DrowsyAlert, Notifier};
    use detector::{Assessment, Detection, Detector, DetectorError, DrowsinessMetrics};
    use frame_capture::Frame;

    /// Detector returning a scripted sequence, then the fallback
    #[derive(Clone)]
    pub struct ScriptedDetector {
        script: Arc<Mutex<VecDeque<Result<Detection, ()>>>>,
        fallback: Detection,
        pub calls: Arc<AtomicUsize>,
    }

    impl ScriptedDetector {
        pub fn always(detection: Detection) -> Self {
            Self {
                script: Arc::new(Mutex::new(VecDeque::new())),
                fallback: detection,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn then(self, result: Result<Detection, ()>) -> Self {
            self.script.lock().unwrap().push_back(result);
            self
        }
    }

    impl Detector for ScriptedDetector {
        async fn detect(&self, _frame: &Frame) -> Result<Detection, DetectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(detection)) => Ok(detection),
                Some(Err(())) => Err(DetectorError::Request("scripted failure".into())),
                None => Ok(self.fallback),
            }
        }
    }

    pub fn drowsy(confidence: f32) -> Detection {
        Detection::Subject(Assessment {
            is_drowsy: true,
            confidence,
            metrics: DrowsinessMetrics {
                eyes_closed: true,
                head_down: true,
                ..Default::default()
            },
        })
    }

    pub fn awake() -> Detection {
        Detection::Subject(Assessment::default())
    }

    /// Notifier recording every alert it receives
    #[derive(Clone, Default)]
    pub struct RecordingNotifier {
        pub sent: Arc<Mutex<Vec<DrowsyAlert>>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl Notifier for RecordingNotifier {
        async fn send_drowsy_alert(&self, alert: &DrowsyAlert) -> Result<(), AlertError> {
            self.sent.lock().unwrap().push(alert.clone());
            if self.fail {
                Err(AlertError::Rejected {
                    channel: "test",
                    status: 503,
                })
            } else {
                Ok(())
            }
        }
    }
}
