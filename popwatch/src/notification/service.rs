//! Notification fan-out.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::NotificationDispatcher;
use super::channels::{
    DiscordChannel, DiscordConfig, NotificationChannel, TelegramChannel, TelegramConfig,
};
use super::events::NotificationEvent;
use crate::monitor::ChangeEvent;

/// Channel configuration of the notification service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationServiceConfig {
    pub telegram: TelegramConfig,
    pub discord: DiscordConfig,
}

impl NotificationServiceConfig {
    /// Copy with every secret masked.
    pub fn masked(&self) -> Self {
        Self {
            telegram: self.telegram.masked(),
            discord: self.discord.masked(),
        }
    }
}

/// Delivers notification events to every enabled channel.
///
/// Channels without credentials are left out silently. Delivery is
/// best-effort: failures are logged and never returned to the caller.
pub struct NotificationService {
    config: RwLock<NotificationServiceConfig>,
    channels: RwLock<Vec<Arc<dyn NotificationChannel>>>,
}

fn build_channels(config: &NotificationServiceConfig) -> Vec<Arc<dyn NotificationChannel>> {
    let candidates: Vec<Arc<dyn NotificationChannel>> = vec![
        Arc::new(TelegramChannel::new(config.telegram.clone())),
        Arc::new(DiscordChannel::new(config.discord.clone())),
    ];

    candidates
        .into_iter()
        .filter(|channel| {
            let enabled = channel.is_enabled();
            if !enabled {
                debug!(channel = channel.channel_type(), "Notification channel disabled");
            }
            enabled
        })
        .collect()
}

impl NotificationService {
    pub fn new(config: NotificationServiceConfig) -> Self {
        let channels = build_channels(&config);
        info!(channels = channels.len(), "Notification service initialized");
        Self {
            config: RwLock::new(config),
            channels: RwLock::new(channels),
        }
    }

    /// Service over explicit channels, ignoring configuration.
    pub fn with_channels(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        let channels = channels.into_iter().filter(|c| c.is_enabled()).collect();
        Self {
            config: RwLock::new(NotificationServiceConfig::default()),
            channels: RwLock::new(channels),
        }
    }

    /// Current configuration with secrets masked.
    pub fn config_view(&self) -> NotificationServiceConfig {
        self.config.read().masked()
    }

    /// Replace the configuration and rebuild the channel set.
    pub fn update_config(&self, config: NotificationServiceConfig) {
        let channels = build_channels(&config);
        info!(channels = channels.len(), "Notification configuration updated");
        *self.channels.write() = channels;
        *self.config.write() = config;
    }

    pub fn enabled_channels(&self) -> Vec<&'static str> {
        self.channels
            .read()
            .iter()
            .map(|c| c.channel_type())
            .collect()
    }

    /// Send `event` to every channel concurrently.
    ///
    /// Returns true if at least one channel delivered it.
    pub async fn notify(&self, event: &NotificationEvent) -> bool {
        let channels: Vec<_> = self.channels.read().clone();
        if channels.is_empty() {
            debug!(event_type = event.event_type(), "No notification channels enabled");
            return false;
        }

        let results = join_all(channels.iter().map(|channel| async move {
            (channel.channel_type(), channel.send(event).await)
        }))
        .await;

        let mut delivered = 0;
        for (channel, result) in &results {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    channel = *channel,
                    event_type = event.event_type(),
                    error = %e,
                    "Notification delivery failed"
                ),
            }
        }

        if delivered > 0 {
            info!(
                event_type = event.event_type(),
                delivered,
                total = results.len(),
                "Notification sent"
            );
        } else {
            warn!(event_type = event.event_type(), "All notification channels failed");
        }
        delivered > 0
    }

    /// Send a test notification through every enabled channel.
    pub async fn send_test(&self) -> bool {
        self.notify(&NotificationEvent::test_event()).await
    }
}

#[async_trait]
impl NotificationDispatcher for NotificationService {
    async fn dispatch(&self, event: &ChangeEvent) -> bool {
        self.notify(&NotificationEvent::ProductChanged(event.clone()))
            .await
    }
}
