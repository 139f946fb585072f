//! Per-target alert cooldown gate

use std::time::{Duration, Instant};

use chrono::Utc;
use detector::DrowsinessMetrics;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::notifier::{DrowsyAlert, Notifier, Severity};
use crate::AlertError;

/// Alert gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minimum time between two alerts for the same target (seconds)
    pub cooldown_seconds: f64,
    /// Confidence at or above which an alert is critical (default: 0.90)
    pub critical_threshold: f32,
    /// Confidence at or above which an alert is high (default: 0.80)
    pub high_threshold: f32,
    /// Upper bound on a single notifier call (seconds)
    pub send_timeout_secs: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_seconds: 300.0, // 5 minutes
            critical_threshold: 0.90,
            high_threshold: 0.80,
            send_timeout_secs: 10.0,
        }
    }
}

impl AlertConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.cooldown_seconds.max(0.0)).unwrap_or(Duration::MAX)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.send_timeout_secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// Outcome of one alert attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AlertDecision {
    /// Notifier accepted the alert
    Sent,
    /// Inside the cooldown window; notifier not called
    Suppressed { remaining: Duration },
    /// Notifier failed or timed out
    Failed(String),
}

impl AlertDecision {
    pub fn is_sent(&self) -> bool {
        matches!(self, AlertDecision::Sent)
    }
}

/// Rate-limits drowsiness alerts per target and forwards them to a notifier.
///
/// The gate holds no per-target state itself; the caller owns each target's
/// last-alert timestamp and lends it to [`AlertGate::try_alert`].
pub struct AlertGate<N> {
    config: AlertConfig,
    notifier: N,
}

impl<N: Notifier> AlertGate<N> {
    /// Create a new alert gate
    pub fn new(config: AlertConfig, notifier: N) -> Self {
        info!("Creating alert gate with config: {:?}", config);
        Self { config, notifier }
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Get severity for a detection confidence
    pub fn severity(&self, confidence: f32) -> Severity {
        if confidence >= self.config.critical_threshold {
            Severity::Critical
        } else if confidence >= self.config.high_threshold {
            Severity::High
        } else {
            Severity::Medium
        }
    }

    /// Time left in the cooldown window, or `None` if an alert may go out now
    pub fn cooldown_remaining(&self, last_alert: Option<Instant>, now: Instant) -> Option<Duration> {
        let last = last_alert?;
        let elapsed = now.saturating_duration_since(last);
        let cooldown = self.config.cooldown();
        if elapsed >= cooldown {
            None
        } else {
            Some(cooldown - elapsed)
        }
    }

    /// Attempt to alert for `target`.
    ///
    /// `last_alert` is updated to `now` only when the notifier reports
    /// success, so a failed send does not start a cooldown.
    pub async fn try_alert(
        &self,
        target: &str,
        last_alert: &mut Option<Instant>,
        confidence: f32,
        metrics: &DrowsinessMetrics,
        now: Instant,
    ) -> AlertDecision {
        if let Some(remaining) = self.cooldown_remaining(*last_alert, now) {
            debug!(
                "Alert for {} suppressed: cooldown {:.0}s remaining",
                target,
                remaining.as_secs_f64()
            );
            return AlertDecision::Suppressed { remaining };
        }

        let alert = DrowsyAlert {
            id: Uuid::new_v4(),
            target: target.to_string(),
            confidence,
            severity: self.severity(confidence),
            metrics: *metrics,
            raised_at: Utc::now(),
        };

        let timeout = self.config.send_timeout();
        match tokio::time::timeout(timeout, self.notifier.send_drowsy_alert(&alert)).await {
            Ok(Ok(())) => {
                *last_alert = Some(now);
                info!(
                    "Drowsiness alert sent for {} ({} severity, confidence {:.2})",
                    target,
                    alert.severity.as_str(),
                    confidence
                );
                AlertDecision::Sent
            }
            Ok(Err(e)) => {
                warn!("Alert for {} failed: {}", target, e);
                AlertDecision::Failed(e.to_string())
            }
            Err(_) => {
                let e = AlertError::Timeout(timeout);
                warn!("Alert for {} failed: {}", target, e);
                AlertDecision::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AlertError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct CountingNotifier {
        calls: Arc<AtomicUsize>,
        fail: bool,
        delay: Option<Duration>,
    }

    impl Notifier for CountingNotifier {
        async fn send_drowsy_alert(&self, _alert: &DrowsyAlert) -> Result<(), AlertError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                Err(AlertError::Rejected {
                    channel: "test",
                    status: 500,
                })
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_cooldown_window() {
        let notifier = CountingNotifier::default();
        let gate = AlertGate::new(AlertConfig::default(), notifier.clone());
        let metrics = DrowsinessMetrics::default();
        let t0 = Instant::now();
        let mut last = None;

        let first = gate.try_alert("seat_1", &mut last, 0.95, &metrics, t0).await;
        assert_eq!(first, AlertDecision::Sent);
        assert_eq!(last, Some(t0));

        let second = gate
            .try_alert("seat_1", &mut last, 0.95, &metrics, t0 + Duration::from_secs(200))
            .await;
        assert_eq!(
            second,
            AlertDecision::Suppressed {
                remaining: Duration::from_secs(100)
            }
        );
        assert_eq!(last, Some(t0));

        let third = gate
            .try_alert("seat_1", &mut last, 0.95, &metrics, t0 + Duration::from_secs(301))
            .await;
        assert!(third.is_sent());
        assert_eq!(last, Some(t0 + Duration::from_secs(301)));

        assert_eq!(notifier.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exact_cooldown_boundary_allows_alert() {
        let gate = AlertGate::new(AlertConfig::default(), CountingNotifier::default());
        let t0 = Instant::now();
        let mut last = Some(t0);

        let decision = gate
            .try_alert(
                "seat_1",
                &mut last,
                0.8,
                &DrowsinessMetrics::default(),
                t0 + Duration::from_secs(300),
            )
            .await;
        assert!(decision.is_sent());
    }

    #[tokio::test]
    async fn test_failed_send_keeps_timestamp() {
        let notifier = CountingNotifier {
            fail: true,
            ..Default::default()
        };
        let gate = AlertGate::new(AlertConfig::default(), notifier.clone());
        let t0 = Instant::now();
        let mut last = None;

        let decision = gate
            .try_alert("seat_2", &mut last, 0.9, &DrowsinessMetrics::default(), t0)
            .await;
        assert!(matches!(decision, AlertDecision::Failed(_)));
        assert_eq!(last, None);

        // Next attempt is not suppressed
        let decision = gate
            .try_alert(
                "seat_2",
                &mut last,
                0.9,
                &DrowsinessMetrics::default(),
                t0 + Duration::from_secs(1),
            )
            .await;
        assert!(matches!(decision, AlertDecision::Failed(_)));
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_notifier_times_out() {
        let notifier = CountingNotifier {
            delay: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let config = AlertConfig {
            send_timeout_secs: 1.0,
            ..Default::default()
        };
        let gate = AlertGate::new(config, notifier);
        let mut last = None;

        let decision = gate
            .try_alert(
                "seat_3",
                &mut last,
                0.95,
                &DrowsinessMetrics::default(),
                Instant::now(),
            )
            .await;
        assert_eq!(
            decision,
            AlertDecision::Failed(AlertError::Timeout(Duration::from_secs(1)).to_string())
        );
        assert_eq!(last, None);
    }

    #[test]
    fn test_severity() {
        let gate = AlertGate::new(AlertConfig::default(), CountingNotifier::default());
        assert_eq!(gate.severity(0.95), Severity::Critical);
        assert_eq!(gate.severity(0.90), Severity::Critical);
        assert_eq!(gate.severity(0.85), Severity::High);
        assert_eq!(gate.severity(0.60), Severity::Medium);
    }

    #[test]
    fn test_cooldown_remaining_unset() {
        let gate = AlertGate::new(AlertConfig::default(), CountingNotifier::default());
        assert_eq!(gate.cooldown_remaining(None, Instant::now()), None);
    }
}
