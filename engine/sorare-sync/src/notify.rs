//! Completion notifications
//!
//! Delivery is best effort: failures are logged and never reach the caller.

use crate::config::TelegramConfig;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Fire-and-forget message sink
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text` (Telegram HTML markup allowed)
    async fn notify(&self, text: &str);
}

/// Sends messages through a Telegram bot
pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    /// Create a notifier for the given bot and chat
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(TELEGRAM_TIMEOUT).build()?;
        Ok(Self { client, bot_token: bot_token.into(), chat_id: chat_id.into() })
    }

    fn endpoint(&self) -> String {
        format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token)
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) {
        let payload = json!({ "chat_id": self.chat_id, "text": text, "parse_mode": "HTML" });

        match self.client.post(self.endpoint()).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Telegram notification sent");
            }
            Ok(response) => {
                warn!("Telegram notification rejected with status {}", response.status());
            }
            Err(e) => {
                warn!("Telegram notification failed: {}", e);
            }
        }
    }
}

/// Writes messages to the log; used when no chat is configured
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) {
        info!("Notification: {}", text);
    }
}

/// Pick the notifier matching the configuration
pub fn notifier_from_config(config: &TelegramConfig) -> Box<dyn Notifier> {
    match config.credentials() {
        Some((token, chat)) => match TelegramNotifier::new(token, chat) {
            Ok(notifier) => Box::new(notifier),
            Err(e) => {
                warn!("Telegram notifier unavailable, logging notifications instead: {}", e);
                Box::new(LogNotifier)
            }
        },
        None => {
            info!("Telegram token or chat id not configured, logging notifications");
            Box::new(LogNotifier)
        }
    }
}

/// Message sent when a job finishes
pub fn completion_message(title: &str, elapsed: Duration) -> String {
    format!("✅ <b>{}</b>\n\n⏱️ Time: {:.2}s", title, elapsed.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_message() {
        let message = completion_message("Floor Prices Updated", Duration::from_millis(1500));
        assert_eq!(message, "✅ <b>Floor Prices Updated</b>\n\n⏱️ Time: 1.50s");
    }

    #[test]
    fn test_unconfigured_notifier_logs() {
        let notifier = notifier_from_config(&TelegramConfig::default());
        tokio_test::block_on(notifier.notify("hello"));
    }
}
