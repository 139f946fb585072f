//! Channel switching for single-view viewers

use std::collections::HashMap;
use std::future::Future;

use tokio::process::Command;
use tracing::debug;

use crate::{expand_args, CaptureError};

/// Brings one channel into the shared viewport
pub trait ChannelSwitcher {
    /// Switch the viewer to `channel` (1-based)
    fn switch_to(&mut self, channel: u32) -> impl Future<Output = Result<(), CaptureError>> + Send;

    /// Number of channels the viewer exposes
    fn total_channels(&self) -> u32;
}

/// Switches channels by running a command against the channel's button position.
///
/// Arguments may contain `{channel}`, `{x}` and `{y}` placeholders, e.g.
/// `["xdotool", "mousemove", "{x}", "{y}", "click", "1"]`.
pub struct CommandSwitcher {
    command: Vec<String>,
    buttons: HashMap<u32, (i32, i32)>,
    total_channels: u32,
    current: Option<u32>,
}

impl CommandSwitcher {
    pub fn new(
        command: Vec<String>,
        buttons: HashMap<u32, (i32, i32)>,
        total_channels: u32,
    ) -> Result<Self, CaptureError> {
        if command.is_empty() {
            return Err(CaptureError::Command("empty switch command".into()));
        }
        Ok(Self {
            command,
            buttons,
            total_channels,
            current: None,
        })
    }

    /// Channel currently shown, if a switch has succeeded
    pub fn current(&self) -> Option<u32> {
        self.current
    }

    fn button(&self, channel: u32) -> Result<(i32, i32), CaptureError> {
        if channel < 1 || channel > self.total_channels {
            return Err(CaptureError::InvalidChannel {
                channel,
                total: self.total_channels,
            });
        }
        self.buttons
            .get(&channel)
            .copied()
            .ok_or(CaptureError::MissingButton(channel))
    }
}

impl ChannelSwitcher for CommandSwitcher {
    async fn switch_to(&mut self, channel: u32) -> Result<(), CaptureError> {
        let (x, y) = self.button(channel)?;
        let args = expand_args(
            &self.command[1..],
            &[
                ("channel", channel.to_string()),
                ("x", x.to_string()),
                ("y", y.to_string()),
            ],
        );
        debug!("Switching to CH{:02} via {} {:?}", channel, self.command[0], args);

        let status = Command::new(&self.command[0])
            .args(&args)
            .kill_on_drop(true)
            .status()
            .await?;

        if !status.success() {
            return Err(CaptureError::Command(format!(
                "{} exited with {}",
                self.command[0], status
            )));
        }

        self.current = Some(channel);
        Ok(())
    }

    fn total_channels(&self) -> u32 {
        self.total_channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn switcher(command: &[&str]) -> CommandSwitcher {
        let buttons = HashMap::from([(1, (100, 900)), (2, (140, 900))]);
        CommandSwitcher::new(command.iter().map(|s| s.to_string()).collect(), buttons, 16).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_channel() {
        let mut sw = switcher(&["true"]);
        let err = sw.switch_to(17).await.unwrap_err();
        assert!(matches!(err, CaptureError::InvalidChannel { channel: 17, total: 16 }));
        assert!(matches!(sw.switch_to(0).await, Err(CaptureError::InvalidChannel { .. })));
    }

    #[tokio::test]
    async fn test_missing_button() {
        let mut sw = switcher(&["true"]);
        assert!(matches!(sw.switch_to(3).await, Err(CaptureError::MissingButton(3))));
        assert_eq!(sw.current(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_switch_runs_command() {
        let mut sw = switcher(&["true"]);
        sw.switch_to(2).await.unwrap();
        assert_eq!(sw.current(), Some(2));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command() {
        let mut sw = switcher(&["false"]);
        assert!(matches!(sw.switch_to(1).await, Err(CaptureError::Command(_))));
        assert_eq!(sw.current(), None);
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(CommandSwitcher::new(vec![], HashMap::new(), 16).is_err());
    }
}
