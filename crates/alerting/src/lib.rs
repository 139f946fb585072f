//! Alerting System
//!
//! Provides the per-target cooldown gate in front of outbound notifications,
//! the notifier port, and its transports (console, webhook, Telegram).

mod gate;
mod notifier;
mod transports;

pub use gate::{AlertConfig, AlertDecision, AlertGate};
pub use notifier::{DrowsyAlert, Notifier, Severity};
pub use transports::{
    ConsoleNotifier, ConfiguredNotifier, NotifierConfig, NotifierSet, TelegramNotifier,
    WebhookNotifier,
};

use thiserror::Error;

/// Alerting errors
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("HTTP error on {channel}: {message}")]
    Http { channel: &'static str, message: String },

    #[error("{channel} rejected alert with status {status}")]
    Rejected { channel: &'static str, status: u16 },

    #[error("Notifier timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Notifier configuration error: {0}")]
    Config(String),

    #[error("All {0} notifier channels failed")]
    AllFailed(usize),
}
