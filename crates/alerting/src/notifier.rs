//! Notifier port and alert payload

use std::future::Future;

use chrono::{DateTime, Utc};
use detector::DrowsinessMetrics;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AlertError;

/// Alert severity, derived from detection confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// One drowsiness alert for one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrowsyAlert {
    pub id: Uuid,
    /// Seat or channel label
    pub target: String,
    pub confidence: f32,
    pub severity: Severity,
    pub metrics: DrowsinessMetrics,
    pub raised_at: DateTime<Utc>,
}

impl DrowsyAlert {
    /// Human-readable alert text (Markdown)
    pub fn message(&self) -> String {
        let m = &self.metrics;
        format!(
            "🚨 *Drowsiness alert* 🚨\n\n\
             📍 Seat: {}\n\
             ⏰ Time: {}\n\
             📊 Confidence: {:.1}% ({})\n\n\
             *Details:*\n\
             • EAR: {:.3}\n\
             • Head tilt: {:.3}\n\
             • Eyes: {}\n\
             • Head: {}",
            self.target,
            self.raised_at.format("%Y-%m-%d %H:%M:%S"),
            self.confidence * 100.0,
            self.severity.as_str(),
            m.ear,
            m.head_tilt,
            if m.eyes_closed { "CLOSED" } else { "OPEN" },
            if m.head_down { "DOWN" } else { "UP" },
        )
    }
}

/// Notifier port. Sends are not idempotent; the gate is responsible for
/// not calling twice inside a cooldown.
pub trait Notifier {
    fn send_drowsy_alert(
        &self,
        alert: &DrowsyAlert,
    ) -> impl Future<Output = Result<(), AlertError>> + Send;
}
