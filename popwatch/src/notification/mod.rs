//! Notification delivery.
//!
//! The update pipeline hands every [`ChangeEvent`] to a
//! [`NotificationDispatcher`]. [`NotificationService`] is the production
//! dispatcher; it fans out to the configured channels and never propagates
//! delivery failures.

pub mod channels;
pub mod events;
mod service;

pub use channels::{DiscordConfig, NotificationChannel, TelegramConfig};
pub use events::{NotificationEvent, NotificationPriority};
pub use service::{NotificationService, NotificationServiceConfig};

use async_trait::async_trait;

use crate::monitor::ChangeEvent;

/// Best-effort sink for change events.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver `event`; returns whether any channel accepted it.
    async fn dispatch(&self, event: &ChangeEvent) -> bool;
}
