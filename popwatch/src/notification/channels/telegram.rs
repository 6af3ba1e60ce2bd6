//! Telegram Bot API notification channel.
//!
//! Sends messages via `POST /bot<token>/sendMessage` and honours the
//! `parameters.retry_after` field of 429 responses.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{DEFAULT_RATE_LIMIT_WAIT, MAX_RATE_LIMIT_RETRIES, NotificationChannel, mask_secret};
use crate::notification::events::{NotificationEvent, NotificationPriority};
use crate::{Error, Result};

/// Telegram `sendMessage` text limit (UTF-8 characters).
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram channel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub enabled: bool,
    /// Telegram Bot API token.
    pub bot_token: String,
    /// Target chat ID (user, group, or channel).
    pub chat_id: String,
    /// HTML or Markdown.
    #[serde(default = "default_parse_mode")]
    pub parse_mode: String,
    /// Minimum priority level to send (default: Low, everything).
    #[serde(default = "default_min_priority")]
    pub min_priority: NotificationPriority,
}

fn default_parse_mode() -> String {
    "HTML".to_string()
}

fn default_min_priority() -> NotificationPriority {
    NotificationPriority::Low
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_token: String::new(),
            chat_id: String::new(),
            parse_mode: default_parse_mode(),
            min_priority: default_min_priority(),
        }
    }
}

impl TelegramConfig {
    pub fn has_credentials(&self) -> bool {
        !self.bot_token.trim().is_empty() && !self.chat_id.trim().is_empty()
    }

    /// Copy with the bot token masked.
    pub fn masked(&self) -> Self {
        Self {
            bot_token: mask_secret(&self.bot_token),
            ..self.clone()
        }
    }
}

/// Telegram notification channel.
pub struct TelegramChannel {
    config: TelegramConfig,
    client: Client,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        crate::utils::http_client::install_rustls_provider();
        Self {
            config,
            client: Client::new(),
        }
    }

    fn is_html(&self) -> bool {
        self.config.parse_mode.eq_ignore_ascii_case("html")
    }

    /// Build the message text for an event.
    fn build_message(&self, event: &NotificationEvent) -> String {
        let emoji = match event.priority() {
            NotificationPriority::Low => "\u{2139}\u{fe0f}",
            NotificationPriority::Normal => "\u{1f514}",
            NotificationPriority::High => "\u{1f389}",
            NotificationPriority::Critical => "\u{1f6a8}",
        };

        let title = event.title();
        let description = event.description();

        let text = if self.is_html() {
            format!(
                "{emoji} <b>{}</b>\n\n{}",
                escape_html(&title),
                escape_html(&description)
            )
        } else {
            format!("{emoji} *{title}*\n\n{description}")
        };

        truncate_message(&text, TELEGRAM_MESSAGE_LIMIT)
    }

    async fn send_with_retry(&self, payload: &serde_json::Value) -> Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            TELEGRAM_API_BASE, self.config.bot_token
        );
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(&url)
                .json(payload)
                .send()
                .await
                .map_err(|e| Error::Other(format!("Telegram request failed: {}", e)))?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            if status.as_u16() == 429 {
                let body: serde_json::Value = response.json().await.unwrap_or_default();
                let retry_after = retry_after_from_body(&body);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        retries = MAX_RATE_LIMIT_RETRIES,
                        ?retry_after,
                        "Telegram rate limit: max retries exceeded"
                    );
                    return Err(Error::Other(format!(
                        "Telegram rate limit exceeded after {} retries",
                        MAX_RATE_LIMIT_RETRIES
                    )));
                }

                let wait = retry_after.unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
                debug!(?wait, attempt = attempts, "Telegram rate limited (429), waiting");
                tokio::time::sleep(wait).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(Error::Other(format!(
                "Telegram sendMessage failed: {} - {}",
                status, body
            )));
        }
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn channel_type(&self) -> &'static str {
        "telegram"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.has_credentials()
    }

    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        if event.priority() < self.config.min_priority {
            debug!(
                event_type = event.event_type(),
                priority = %event.priority(),
                "Skipping Telegram notification below minimum priority"
            );
            return Ok(());
        }

        let payload = json!({
            "chat_id": self.config.chat_id,
            "text": self.build_message(event),
            "parse_mode": self.config.parse_mode,
            "disable_web_page_preview": false,
        });

        self.send_with_retry(&payload).await?;

        debug!(event_type = event.event_type(), "Telegram notification sent");
        Ok(())
    }
}

fn retry_after_from_body(body: &serde_json::Value) -> Option<Duration> {
    body.get("parameters")
        .and_then(|p| p.get("retry_after"))
        .and_then(|v| v.as_u64())
        .map(Duration::from_secs)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Truncate a message to fit within the Telegram character limit.
fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let suffix = "\n\n[truncated]";
    let budget = limit - suffix.len();
    let truncated: String = text.chars().take(budget).collect();
    format!("{truncated}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> TelegramConfig {
        TelegramConfig {
            bot_token: "123:ABC".to_string(),
            chat_id: "456".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_credentials_disable_channel() {
        let channel = TelegramChannel::new(TelegramConfig::default());
        assert!(!channel.is_enabled());
        assert!(TelegramChannel::new(configured()).is_enabled());
    }

    #[test]
    fn test_masked_config() {
        let masked = configured().masked();
        assert_eq!(masked.bot_token, "***");
        assert_eq!(masked.chat_id, "456");
        assert_eq!(TelegramConfig::default().masked().bot_token, "");
    }

    #[test]
    fn test_build_message_escapes_html() {
        let channel = TelegramChannel::new(configured());
        let event = NotificationEvent::test_event();
        let msg = channel.build_message(&event);
        assert!(msg.contains("<b>Test notification</b>"));
        assert_eq!(escape_html("a<b>&c"), "a&lt;b&gt;&amp;c");
    }

    #[test]
    fn test_markdown_mode() {
        let channel = TelegramChannel::new(TelegramConfig {
            parse_mode: "Markdown".to_string(),
            ..configured()
        });
        let msg = channel.build_message(&NotificationEvent::test_event());
        assert!(msg.contains("*Test notification*"));
    }

    #[test]
    fn test_retry_after_parsing() {
        let body = json!({"ok": false, "parameters": {"retry_after": 7}});
        assert_eq!(retry_after_from_body(&body), Some(Duration::from_secs(7)));
        assert_eq!(retry_after_from_body(&json!({})), None);
    }

    #[test]
    fn test_truncate_message() {
        assert_eq!(truncate_message("hello", 100), "hello");

        let long: String = "a".repeat(5000);
        let truncated = truncate_message(&long, TELEGRAM_MESSAGE_LIMIT);
        assert!(truncated.chars().count() <= TELEGRAM_MESSAGE_LIMIT);
        assert!(truncated.ends_with("[truncated]"));
    }
}
