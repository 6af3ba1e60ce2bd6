//! Notification channels.
//!
//! - Discord webhooks
//! - Telegram Bot API

mod discord;
mod telegram;

pub use discord::{DiscordChannel, DiscordConfig};
pub use telegram::{TelegramChannel, TelegramConfig};

use std::time::Duration;

use async_trait::async_trait;

use super::events::NotificationEvent;
use crate::Result;

/// Maximum number of attempts for rate-limited requests.
pub(crate) const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Wait used when a 429 response carries no usable hint.
pub(crate) const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(1);

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Get the channel type name.
    fn channel_type(&self) -> &'static str;

    /// Whether the channel is enabled and has the credentials it needs.
    fn is_enabled(&self) -> bool;

    /// Send a notification through this channel.
    async fn send(&self, event: &NotificationEvent) -> Result<()>;
}

/// Replace a secret with a fixed mask, keeping emptiness visible.
pub(crate) fn mask_secret(value: &str) -> String {
    if value.is_empty() {
        String::new()
    } else {
        "***".to_string()
    }
}
