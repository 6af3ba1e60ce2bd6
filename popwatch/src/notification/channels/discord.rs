//! Discord webhook notification channel.
//!
//! Retries 429 responses using the `Retry-After` header, falling back to
//! `X-RateLimit-Reset-After`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{DEFAULT_RATE_LIMIT_WAIT, MAX_RATE_LIMIT_RETRIES, NotificationChannel, mask_secret};
use crate::notification::events::{NotificationEvent, NotificationPriority};
use crate::{Error, Result};

/// Discord channel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub enabled: bool,
    /// Discord webhook URL.
    pub webhook_url: String,
    /// Optional username for the webhook.
    pub username: Option<String>,
    /// Optional avatar URL for the webhook.
    pub avatar_url: Option<String>,
    /// Minimum priority level to send (default: Low, everything).
    #[serde(default = "default_min_priority")]
    pub min_priority: NotificationPriority,
}

fn default_min_priority() -> NotificationPriority {
    NotificationPriority::Low
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: String::new(),
            username: Some("popwatch".to_string()),
            avatar_url: None,
            min_priority: default_min_priority(),
        }
    }
}

impl DiscordConfig {
    pub fn has_credentials(&self) -> bool {
        !self.webhook_url.trim().is_empty()
    }

    /// Copy with the webhook URL masked.
    pub fn masked(&self) -> Self {
        Self {
            webhook_url: mask_secret(&self.webhook_url),
            ..self.clone()
        }
    }
}

/// Discord notification channel.
pub struct DiscordChannel {
    config: DiscordConfig,
    client: Client,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig) -> Self {
        crate::utils::http_client::install_rustls_provider();
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Get the embed color based on the event.
    fn get_color(event: &NotificationEvent) -> u32 {
        match event.priority() {
            NotificationPriority::Low => 0x808080,
            NotificationPriority::Normal => 0x3498db,
            NotificationPriority::High => 0x00ff00,
            NotificationPriority::Critical => 0xe74c3c,
        }
    }

    /// Build the webhook payload for an event.
    fn build_payload(&self, event: &NotificationEvent) -> serde_json::Value {
        let mut embed = json!({
            "title": event.title(),
            "description": event.description(),
            "color": Self::get_color(event),
            "timestamp": event.timestamp().to_rfc3339(),
            "footer": {
                "text": format!("popwatch | {}", event.event_type())
            }
        });
        if let Some(url) = event.url() {
            embed["url"] = json!(url);
        }
        if let Some(image_url) = event.image_url() {
            embed["thumbnail"] = json!({ "url": image_url });
        }

        let mut payload = json!({
            "embeds": [embed]
        });

        if let Some(username) = &self.config.username {
            payload["username"] = json!(username);
        }
        if let Some(avatar_url) = &self.config.avatar_url {
            payload["avatar_url"] = json!(avatar_url);
        }

        payload
    }

    async fn send_with_retry(&self, payload: &serde_json::Value) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(&self.config.webhook_url)
                .json(payload)
                .send()
                .await
                .map_err(|e| Error::Other(format!("Discord request failed: {}", e)))?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            if status.as_u16() == 429 {
                let retry_after = parse_retry_after(response.headers());

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        retries = MAX_RATE_LIMIT_RETRIES,
                        ?retry_after,
                        "Discord rate limit: max retries exceeded"
                    );
                    return Err(Error::Other(format!(
                        "Discord rate limit exceeded after {} retries",
                        MAX_RATE_LIMIT_RETRIES
                    )));
                }

                let wait = retry_after.unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
                debug!(?wait, attempt = attempts, "Discord rate limited (429), waiting");
                tokio::time::sleep(wait).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(Error::Other(format!(
                "Discord webhook failed: {} - {}",
                status, body
            )));
        }
    }
}

/// Parse the wait hint from a 429 response.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    ["Retry-After", "X-RateLimit-Reset-After"]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok()?.parse::<f64>().ok())
        .find(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    fn channel_type(&self) -> &'static str {
        "discord"
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
                "Skipping Discord notification below minimum priority"
            );
            return Ok(());
        }

        let payload = self.build_payload(event);
        self.send_with_retry(&payload).await?;

        debug!(event_type = event.event_type(), "Discord notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProductSnapshot;
    use crate::monitor::{ChangeEvent, ChangeKind};
    use reqwest::header::{HeaderMap, HeaderValue};

    fn configured() -> DiscordConfig {
        DiscordConfig {
            webhook_url: "https://discord.com/api/webhooks/1/abc".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_webhook_disables_channel() {
        assert!(!DiscordChannel::new(DiscordConfig::default()).is_enabled());
        assert!(DiscordChannel::new(configured()).is_enabled());
        let disabled = DiscordConfig {
            enabled: false,
            ..configured()
        };
        assert!(!DiscordChannel::new(disabled).is_enabled());
    }

    #[test]
    fn test_build_payload() {
        let channel = DiscordChannel::new(configured());
        let mut product = ProductSnapshot::new("p9", "HIRONO 夢幻星球系列", 89.0).with_stock(true, 3);
        product.product_url = Some("https://www.popmart.com/hk/products/p9".into());
        let event = NotificationEvent::ProductChanged(ChangeEvent::new(
            ChangeKind::Restocked {
                old_quantity: 0,
                new_quantity: 3,
            },
            product,
            chrono::Utc::now(),
        ));

        let payload = channel.build_payload(&event);
        let embed = &payload["embeds"][0];
        assert_eq!(embed["title"], "Back in stock");
        assert!(embed["description"].as_str().unwrap().contains("HIRONO"));
        assert_eq!(embed["color"], 0x00ff00);
        assert_eq!(embed["url"], "https://www.popmart.com/hk/products/p9");
        assert_eq!(payload["username"], "popwatch");
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert("X-RateLimit-Reset-After", HeaderValue::from_static("0.5"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_millis(500)));

        headers.insert("Retry-After", HeaderValue::from_static("2"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_masked_config() {
        assert_eq!(configured().masked().webhook_url, "***");
    }
}
