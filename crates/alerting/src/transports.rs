//! Notifier transports

use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::notifier::{DrowsyAlert, Notifier};
use crate::AlertError;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Notifier channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Log alerts locally
    pub console: bool,
    /// JSON webhook endpoint
    pub webhook_url: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_ids: Vec<String>,
    /// HTTP request timeout (seconds)
    pub timeout_secs: f64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            console: true,
            webhook_url: None,
            telegram_bot_token: None,
            telegram_chat_ids: Vec::new(),
            timeout_secs: 10.0,
        }
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, AlertError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AlertError::Config(e.to_string()))
}

fn http_error(channel: &'static str, err: reqwest::Error) -> AlertError {
    AlertError::Http {
        channel,
        message: err.to_string(),
    }
}

/// Writes alerts to the log
#[derive(Debug, Clone, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    async fn send_drowsy_alert(&self, alert: &DrowsyAlert) -> Result<(), AlertError> {
        warn!(
            "DROWSY ALERT [{}] target={} confidence={:.2} ear={:.3} head_tilt={:.3}",
            alert.severity.as_str(),
            alert.target,
            alert.confidence,
            alert.metrics.ear,
            alert.metrics.head_tilt
        );
        Ok(())
    }
}

impl ConsoleNotifier {
    pub async fn send_system_message(&self, text: &str) -> Result<(), AlertError> {
        info!("[system] {}", text);
        Ok(())
    }
}

/// Posts alerts as JSON to a webhook
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AlertError> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.into(),
        })
    }

    /// Webhook request body
    pub fn payload(alert: &DrowsyAlert) -> serde_json::Value {
        json!({
            "type": "drowsy_alert",
            "id": alert.id,
            "channel": alert.target,
            "confidence": alert.confidence,
            "severity": alert.severity,
            "timestamp": alert.raised_at.to_rfc3339(),
            "details": alert.metrics,
        })
    }

    /// Webhook request body for an operational notice
    pub fn system_payload(text: &str) -> serde_json::Value {
        json!({
            "type": "system_message",
            "message": text,
            "timestamp": Utc::now().to_rfc3339(),
        })
    }

    async fn post(&self, body: &serde_json::Value) -> Result<(), AlertError> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| http_error("webhook", e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AlertError::Rejected {
                channel: "webhook",
                status: status.as_u16(),
            })
        }
    }

    pub async fn send_system_message(&self, text: &str) -> Result<(), AlertError> {
        self.post(&Self::system_payload(text)).await
    }
}

impl Notifier for WebhookNotifier {
    async fn send_drowsy_alert(&self, alert: &DrowsyAlert) -> Result<(), AlertError> {
        self.post(&Self::payload(alert)).await?;
        debug!("Webhook accepted alert {}", alert.id);
        Ok(())
    }
}

/// Sends alerts through a Telegram bot to one or more chats
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    token: String,
    chat_ids: Vec<String>,
}

impl TelegramNotifier {
    pub fn new(
        token: impl Into<String>,
        chat_ids: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, AlertError> {
        if chat_ids.is_empty() {
            return Err(AlertError::Config(
                "telegram notifier needs at least one chat id".to_string(),
            ));
        }
        Ok(Self {
            client: http_client(timeout)?,
            api_base: TELEGRAM_API.to_string(),
            token: token.into(),
            chat_ids,
        })
    }

    /// Override the Bot API base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn send_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }

    async fn send_to(&self, chat_id: &str, text: &str) -> Result<(), AlertError> {
        let response = self
            .client
            .post(self.send_url())
            .json(&json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "Markdown",
            }))
            .send()
            .await
            .map_err(|e| http_error("telegram", e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AlertError::Rejected {
                channel: "telegram",
                status: status.as_u16(),
            })
        }
    }
}

impl TelegramNotifier {
    /// Text of an operational notice
    pub fn system_text(text: &str) -> String {
        format!("*System notice*\n\n{}", text)
    }

    /// Succeeds if at least one chat received `text`
    async fn broadcast(&self, text: &str) -> Result<(), AlertError> {
        let results = join_all(self.chat_ids.iter().map(|id| self.send_to(id, text))).await;

        let mut delivered = 0;
        for (chat_id, result) in self.chat_ids.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Telegram delivery to chat {} failed: {}", chat_id, e),
            }
        }

        if delivered > 0 {
            Ok(())
        } else {
            Err(AlertError::AllFailed(self.chat_ids.len()))
        }
    }

    pub async fn send_system_message(&self, text: &str) -> Result<(), AlertError> {
        self.broadcast(&Self::system_text(text)).await
    }
}

impl Notifier for TelegramNotifier {
    async fn send_drowsy_alert(&self, alert: &DrowsyAlert) -> Result<(), AlertError> {
        self.broadcast(&alert.message()).await
    }
}

/// A notifier channel built from configuration
#[derive(Debug, Clone)]
pub enum ConfiguredNotifier {
    Console(ConsoleNotifier),
    Webhook(WebhookNotifier),
    Telegram(TelegramNotifier),
}

impl ConfiguredNotifier {
    pub fn name(&self) -> &'static str {
        match self {
            ConfiguredNotifier::Console(_) => "console",
            ConfiguredNotifier::Webhook(_) => "webhook",
            ConfiguredNotifier::Telegram(_) => "telegram",
        }
    }

    pub async fn send_system_message(&self, text: &str) -> Result<(), AlertError> {
        match self {
            ConfiguredNotifier::Console(n) => n.send_system_message(text).await,
            ConfiguredNotifier::Webhook(n) => n.send_system_message(text).await,
            ConfiguredNotifier::Telegram(n) => n.send_system_message(text).await,
        }
    }
}

impl Notifier for ConfiguredNotifier {
    async fn send_drowsy_alert(&self, alert: &DrowsyAlert) -> Result<(), AlertError> {
        match self {
            ConfiguredNotifier::Console(n) => n.send_drowsy_alert(alert).await,
            ConfiguredNotifier::Webhook(n) => n.send_drowsy_alert(alert).await,
            ConfiguredNotifier::Telegram(n) => n.send_drowsy_alert(alert).await,
        }
    }
}

/// Fans an alert out to every configured channel
#[derive(Debug, Clone, Default)]
pub struct NotifierSet {
    channels: Vec<ConfiguredNotifier>,
}

impl NotifierSet {
    pub fn new(channels: Vec<ConfiguredNotifier>) -> Self {
        Self { channels }
    }

    /// Build channels from configuration. Falls back to the console channel
    /// when nothing else is configured.
    pub fn from_config(config: &NotifierConfig) -> Result<Self, AlertError> {
        let timeout =
            Duration::try_from_secs_f64(config.timeout_secs.max(0.0)).unwrap_or(Duration::MAX);
        let mut channels = Vec::new();

        if let Some(url) = &config.webhook_url {
            channels.push(ConfiguredNotifier::Webhook(WebhookNotifier::new(
                url.clone(),
                timeout,
            )?));
        }

        if let Some(token) = &config.telegram_bot_token {
            channels.push(ConfiguredNotifier::Telegram(TelegramNotifier::new(
                token.clone(),
                config.telegram_chat_ids.clone(),
                timeout,
            )?));
        }

        if config.console || channels.is_empty() {
            channels.push(ConfiguredNotifier::Console(ConsoleNotifier));
        }

        info!(
            "Notifier channels: {}",
            channels
                .iter()
                .map(|c| c.name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self { channels })
    }

    pub fn channels(&self) -> &[ConfiguredNotifier] {
        &self.channels
    }

    /// Send an operational notice (startup, shutdown) to every channel.
    /// Succeeds if any channel succeeded.
    pub async fn send_system_message(&self, text: &str) -> Result<(), AlertError> {
        if self.channels.is_empty() {
            return Err(AlertError::Config("no notifier channels".to_string()));
        }
        let results = join_all(self.channels.iter().map(|c| c.send_system_message(text))).await;
        self.settle(results)
    }

    /// Send a connection test through each channel and report per channel
    pub async fn test_channels(&self) -> Vec<(&'static str, Result<(), AlertError>)> {
        let text = format!("Connection test at {}", Utc::now().format("%H:%M:%S UTC"));
        let results = join_all(self.channels.iter().map(|c| c.send_system_message(&text))).await;
        self.channels.iter().map(|c| c.name()).zip(results).collect()
    }

    fn settle(&self, results: Vec<Result<(), AlertError>>) -> Result<(), AlertError> {
        let mut delivered = 0;
        for (channel, result) in self.channels.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!("{} notifier failed: {}", channel.name(), e),
            }
        }

        if delivered > 0 {
            Ok(())
        } else {
            Err(AlertError::AllFailed(self.channels.len()))
        }
    }
}

impl Notifier for NotifierSet {
    /// Succeeds if any channel succeeded
    async fn send_drowsy_alert(&self, alert: &DrowsyAlert) -> Result<(), AlertError> {
        if self.channels.is_empty() {
            return Err(AlertError::Config("no notifier channels".to_string()));
        }
        let results = join_all(self.channels.iter().map(|c| c.send_drowsy_alert(alert))).await;
        self.settle(results)
    }
}
