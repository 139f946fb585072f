//! Per-target hysteresis state machine

use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use detector::{Assessment, DrowsinessMetrics};
use serde::{Deserialize, Serialize};

/// Samples kept per target for diagnostics
pub const HISTORY_CAPACITY: usize = 10;

/// Seat id (`"A1"`) or channel label (`"CH01"`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Label of a sequential channel, `CH01`..`CHnn`
    pub fn channel(channel: u32) -> Self {
        Self(format!("CH{:02}", channel))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One detector result for an occupied target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub is_drowsy: bool,
    pub confidence: f32,
    pub metrics: DrowsinessMetrics,
}

impl Sample {
    pub fn from_assessment(assessment: &Assessment, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            is_drowsy: assessment.is_drowsy,
            confidence: assessment.confidence,
            metrics: assessment.metrics,
        }
    }

    /// Occupied, but nothing assessable this tick
    pub fn alert_free(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            is_drowsy: false,
            confidence: 0.0,
            metrics: DrowsinessMetrics::default(),
        }
    }
}

/// Bounded FIFO of recent samples, oldest first
#[derive(Debug, Clone)]
pub struct SampleHistory {
    data: VecDeque<Sample>,
    capacity: usize,
}

impl SampleHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: Sample) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.data.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.data.iter()
    }
}

impl Default for SampleHistory {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

/// When the drowsy counter is cleared after reaching the threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// Clear on every alert attempt, sent or not
    #[default]
    OnAttempt,
    /// Clear only when the notifier accepted the alert
    OnSend,
}

/// Hysteresis parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Minimum confidence for a drowsy sample to count
    pub confidence: f32,
    /// Net drowsy samples (after decay) needed before alerting
    pub drowsy_count: u32,
    pub reset: ResetPolicy,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            confidence: 0.75,
            drowsy_count: 5,
            reset: ResetPolicy::OnAttempt,
        }
    }
}

/// What the sampler saw for one target on one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    Vacant,
    Occupied(Sample),
}

/// Result of feeding one observation into a target
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// Not occupied; counter cleared
    Vacated,
    /// Occupied, not drowsy; counter decayed
    Steady,
    /// Drowsy, still below the threshold
    Accumulating,
    /// Threshold reached; an alert attempt is due for this sample
    AlertDue { confidence: f32, metrics: DrowsinessMetrics },
}

impl Transition {
    /// Whether the tick counted as a drowsy detection
    pub fn is_drowsy(&self) -> bool {
        matches!(self, Transition::Accumulating | Transition::AlertDue { .. })
    }
}

/// Conceptual state of a target as of its last tick.
///
/// `OccupiedAlerting` means the drowsy counter reached the threshold on
/// that tick, even if the alert attempt has since cleared the counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPhase {
    #[default]
    Empty,
    OccupiedNormal,
    OccupiedAlerting,
}

/// Monitoring state of one target
#[derive(Debug, Clone)]
pub struct TargetState {
    id: TargetId,
    drowsy_counter: u32,
    occupied: bool,
    phase: TargetPhase,
    last_alert: Option<Instant>,
    last_alert_at: Option<DateTime<Utc>>,
    last_check: Option<DateTime<Utc>>,
    history: SampleHistory,
    total_checks: u64,
    total_drowsy_checks: u64,
}

impl TargetState {
    pub fn new(id: TargetId) -> Self {
        Self {
            id,
            drowsy_counter: 0,
            occupied: false,
            phase: TargetPhase::Empty,
            last_alert: None,
            last_alert_at: None,
            last_check: None,
            history: SampleHistory::default(),
            total_checks: 0,
            total_drowsy_checks: 0,
        }
    }

    pub fn id(&self) -> &TargetId {
        &self.id
    }

    pub fn drowsy_counter(&self) -> u32 {
        self.drowsy_counter
    }

    pub fn is_occupied(&self) -> bool {
        self.occupied
    }

    pub fn last_alert(&self) -> Option<Instant> {
        self.last_alert
    }

    pub fn last_alert_at(&self) -> Option<DateTime<Utc>> {
        self.last_alert_at
    }

    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.last_check
    }

    pub fn history(&self) -> &SampleHistory {
        &self.history
    }

    pub fn total_checks(&self) -> u64 {
        self.total_checks
    }

    pub fn total_drowsy_checks(&self) -> u64 {
        self.total_drowsy_checks
    }

    /// Drowsy fraction of all checks
    pub fn drowsy_rate(&self) -> f64 {
        if self.total_checks == 0 {
            0.0
        } else {
            self.total_drowsy_checks as f64 / self.total_checks as f64
        }
    }

    pub fn phase(&self) -> TargetPhase {
        self.phase
    }

    /// Feed one observation. Does not reset the counter on `AlertDue`;
    /// the caller settles that with [`TargetState::settle_alert`].
    pub fn apply(
        &mut self,
        observation: Observation,
        thresholds: &Thresholds,
        checked_at: DateTime<Utc>,
    ) -> Transition {
        self.total_checks += 1;
        self.last_check = Some(checked_at);

        let sample = match observation {
            Observation::Vacant => {
                self.occupied = false;
                self.drowsy_counter = 0;
                self.phase = TargetPhase::Empty;
                return Transition::Vacated;
            }
            Observation::Occupied(sample) => sample,
        };

        self.occupied = true;
        self.history.push(sample);

        let transition = if sample.is_drowsy && sample.confidence >= thresholds.confidence {
            self.drowsy_counter += 1;
            self.total_drowsy_checks += 1;
            if self.drowsy_counter >= thresholds.drowsy_count {
                Transition::AlertDue {
                    confidence: sample.confidence,
                    metrics: sample.metrics,
                }
            } else {
                Transition::Accumulating
            }
        } else {
            self.drowsy_counter = self.drowsy_counter.saturating_sub(1);
            Transition::Steady
        };

        self.phase = if self.drowsy_counter >= thresholds.drowsy_count {
            TargetPhase::OccupiedAlerting
        } else {
            TargetPhase::OccupiedNormal
        };
        transition
    }

    /// Cooldown timestamp lent to the alert gate
    pub fn last_alert_mut(&mut self) -> &mut Option<Instant> {
        &mut self.last_alert
    }

    /// Apply the reset policy after an alert attempt
    pub fn settle_alert(&mut self, sent: bool, policy: ResetPolicy) {
        if sent {
            self.last_alert_at = Some(Utc::now());
        }
        if sent || policy == ResetPolicy::OnAttempt {
            self.drowsy_counter = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drowsy(confidence: f32) -> Observation {
        Observation::Occupied(Sample {
            timestamp: Utc::now(),
            is_drowsy: true,
            confidence,
            metrics: DrowsinessMetrics::default(),
        })
    }

    fn alert_free() -> Observation {
        Observation::Occupied(Sample::alert_free(Utc::now()))
    }

    #[test]
    fn test_vacancy_clears_counter() {
        let thresholds = Thresholds::default();
        let mut state = TargetState::new("A1".into());
        state.apply(drowsy(0.9), &thresholds, Utc::now());
        state.apply(drowsy(0.9), &thresholds, Utc::now());
        assert_eq!(state.drowsy_counter(), 2);

        let t = state.apply(Observation::Vacant, &thresholds, Utc::now());
        assert_eq!(t, Transition::Vacated);
        assert_eq!(state.drowsy_counter(), 0);
        assert!(!state.is_occupied());
        assert_eq!(state.history().len(), 2);
        assert_eq!(state.total_checks(), 3);
        assert_eq!(state.phase(), TargetPhase::Empty);
    }

    #[test]
    fn test_below_threshold_accumulates() {
        let thresholds = Thresholds::default();
        let mut state = TargetState::new("A1".into());
        for _ in 0..4 {
            assert_eq!(
                state.apply(drowsy(0.8), &thresholds, Utc::now()),
                Transition::Accumulating
            );
        }
        assert_eq!(state.drowsy_counter(), 4);
        assert_eq!(state.total_drowsy_checks(), 4);
        assert_eq!(state.phase(), TargetPhase::OccupiedNormal);
    }

    #[test]
    fn test_phase_follows_threshold() {
        let thresholds = Thresholds::default();
        let mut state = TargetState::new("A1".into());
        assert_eq!(state.phase(), TargetPhase::Empty);

        state.apply(drowsy(0.9), &thresholds, Utc::now());
        assert_eq!(state.drowsy_counter(), 1);
        assert_eq!(state.phase(), TargetPhase::OccupiedNormal);

        for _ in 0..3 {
            state.apply(drowsy(0.9), &thresholds, Utc::now());
        }
        assert_eq!(state.phase(), TargetPhase::OccupiedNormal);

        let t = state.apply(drowsy(0.9), &thresholds, Utc::now());
        assert!(matches!(t, Transition::AlertDue { .. }));
        assert_eq!(state.phase(), TargetPhase::OccupiedAlerting);

        // The tick that fired stays labeled alerting after the reset
        state.settle_alert(true, ResetPolicy::OnAttempt);
        assert_eq!(state.drowsy_counter(), 0);
        assert_eq!(state.phase(), TargetPhase::OccupiedAlerting);

        state.apply(alert_free(), &thresholds, Utc::now());
        assert_eq!(state.phase(), TargetPhase::OccupiedNormal);

        state.apply(Observation::Vacant, &thresholds, Utc::now());
        assert_eq!(state.phase(), TargetPhase::Empty);
    }

    #[test]
    fn test_phase_stays_alerting_while_send_keeps_failing() {
        let thresholds = Thresholds {
            reset: ResetPolicy::OnSend,
            ..Default::default()
        };
        let mut state = TargetState::new("A1".into());
        for _ in 0..6 {
            state.apply(drowsy(0.9), &thresholds, Utc::now());
            state.settle_alert(false, thresholds.reset);
        }
        assert_eq!(state.drowsy_counter(), 6);
        assert_eq!(state.phase(), TargetPhase::OccupiedAlerting);

        state.apply(alert_free(), &thresholds, Utc::now());
        assert_eq!(state.drowsy_counter(), 5);
        assert_eq!(state.phase(), TargetPhase::OccupiedAlerting);
    }

    #[test]
    fn test_threshold_reached_and_reset_on_attempt() {
        let thresholds = Thresholds::default();
        let mut state = TargetState::new("A1".into());
        for _ in 0..4 {
            state.apply(drowsy(0.8), &thresholds, Utc::now());
        }
        let t = state.apply(drowsy(0.85), &thresholds, Utc::now());
        assert!(matches!(t, Transition::AlertDue { confidence, .. } if confidence == 0.85));

        state.settle_alert(false, ResetPolicy::OnAttempt);
        assert_eq!(state.drowsy_counter(), 0);
        assert_eq!(state.last_alert_at(), None);
    }

    #[test]
    fn test_reset_on_send_keeps_counter_after_failure() {
        let thresholds = Thresholds {
            reset: ResetPolicy::OnSend,
            ..Default::default()
        };
        let mut state = TargetState::new("A1".into());
        for _ in 0..5 {
            state.apply(drowsy(0.8), &thresholds, Utc::now());
        }
        state.settle_alert(false, thresholds.reset);
        assert_eq!(state.drowsy_counter(), 5);

        // Next drowsy tick is due again
        let t = state.apply(drowsy(0.8), &thresholds, Utc::now());
        assert!(matches!(t, Transition::AlertDue { .. }));
        state.settle_alert(true, thresholds.reset);
        assert_eq!(state.drowsy_counter(), 0);
        assert!(state.last_alert_at().is_some());
    }

    #[test]
    fn test_low_confidence_drowsy_decays() {
        let thresholds = Thresholds::default();
        let mut state = TargetState::new("A1".into());
        state.apply(drowsy(0.9), &thresholds, Utc::now());
        assert_eq!(state.apply(drowsy(0.6), &thresholds, Utc::now()), Transition::Steady);
        assert_eq!(state.drowsy_counter(), 0);
        assert_eq!(state.total_drowsy_checks(), 1);
    }

    #[test]
    fn test_decay_sequence() {
        let thresholds = Thresholds::default();
        let mut state = TargetState::new("A1".into());
        state.apply(drowsy(0.9), &thresholds, Utc::now());
        state.apply(drowsy(0.9), &thresholds, Utc::now());

        let mut seen = vec![state.drowsy_counter()];
        for _ in 0..3 {
            state.apply(alert_free(), &thresholds, Utc::now());
            seen.push(state.drowsy_counter());
        }
        assert_eq!(seen, vec![2, 1, 0, 0]);
        assert_eq!(state.phase(), TargetPhase::OccupiedNormal);
    }

    #[test]
    fn test_history_keeps_most_recent() {
        let thresholds = Thresholds::default();
        let mut state = TargetState::new("A1".into());
        for i in 0..15 {
            let sample = Sample {
                timestamp: Utc::now(),
                is_drowsy: false,
                confidence: i as f32 / 100.0,
                metrics: DrowsinessMetrics::default(),
            };
            state.apply(Observation::Occupied(sample), &thresholds, Utc::now());
        }

        let kept: Vec<f32> = state.history().iter().map(|s| s.confidence).collect();
        let expected: Vec<f32> = (5..15).map(|i| i as f32 / 100.0).collect();
        assert_eq!(kept, expected);
        assert_eq!(state.history().latest().map(|s| s.confidence), Some(0.14));
    }

    #[test]
    fn test_drowsy_rate() {
        let thresholds = Thresholds::default();
        let mut state = TargetState::new("A1".into());
        assert_eq!(state.drowsy_rate(), 0.0);
        state.apply(drowsy(0.9), &thresholds, Utc::now());
        state.apply(alert_free(), &thresholds, Utc::now());
        assert!((state.drowsy_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_channel_label() {
        assert_eq!(TargetId::channel(3).as_str(), "CH03");
        assert_eq!(TargetId::channel(16).to_string(), "CH16");
    }

    #[derive(Debug, Clone)]
    enum Tick {
        Vacant,
        Drowsy(f32),
        Awake,
    }

    fn tick() -> impl Strategy<Value = Tick> {
        prop_oneof![
            Just(Tick::Vacant),
            (0.0f32..=1.0).prop_map(Tick::Drowsy),
            Just(Tick::Awake),
        ]
    }

    proptest! {
        #[test]
        fn prop_state_invariants(ticks in prop::collection::vec(tick(), 0..200)) {
            let thresholds = Thresholds::default();
            let mut state = TargetState::new("P".into());

            for tick in ticks {
                let observation = match tick {
                    Tick::Vacant => Observation::Vacant,
                    Tick::Drowsy(c) => drowsy(c),
                    Tick::Awake => alert_free(),
                };
                let before = state.drowsy_counter();
                let transition = state.apply(observation, &thresholds, Utc::now());
                if let Transition::AlertDue { .. } = transition {
                    state.settle_alert(false, thresholds.reset);
                    prop_assert_eq!(state.drowsy_counter(), 0);
                }

                if !state.is_occupied() {
                    prop_assert_eq!(state.drowsy_counter(), 0);
                }
                if transition == Transition::Steady {
                    prop_assert_eq!(state.drowsy_counter(), before.saturating_sub(1));
                }
                prop_assert!(state.drowsy_counter() < thresholds.drowsy_count);
                prop_assert!(state.history().len() <= HISTORY_CAPACITY);
                prop_assert!(state.total_drowsy_checks() <= state.total_checks());
            }
        }
    }
}
