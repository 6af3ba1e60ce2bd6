//! Change events emitted by the update pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::domain::ProductSnapshot;

/// What changed about a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKind {
    PriceChanged { old_price: f64, new_price: f64 },
    Restocked { old_quantity: i64, new_quantity: i64 },
    SoldOut { old_quantity: i64, new_quantity: i64 },
    NewArrival,
    LimitedRelease,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriceChanged { .. } => "price_changed",
            Self::Restocked { .. } => "restocked",
            Self::SoldOut { .. } => "sold_out",
            Self::NewArrival => "new_arrival",
            Self::LimitedRelease => "limited_release",
        }
    }
}

/// A detected change for one product. Never persisted as such.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(flatten)]
    pub kind: ChangeKind,
    pub product: ProductSnapshot,
    pub detected_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, product: ProductSnapshot, detected_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            product,
            detected_at,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Signed price difference for price changes.
    pub fn change_amount(&self) -> Option<f64> {
        match self.kind {
            ChangeKind::PriceChanged {
                old_price,
                new_price,
            } => Some(new_price - old_price),
            _ => None,
        }
    }

    /// Price difference relative to the old price, in percent rounded to two
    /// decimals. `None` for other kinds or a zero old price.
    pub fn change_percentage(&self) -> Option<f64> {
        match self.kind {
            ChangeKind::PriceChanged {
                old_price,
                new_price,
            } if old_price != 0.0 => {
                let pct = (new_price - old_price) / old_price * 100.0;
                Some((pct * 100.0).round() / 100.0)
            }
            _ => None,
        }
    }

    /// Get a description of the event.
    pub fn description(&self) -> String {
        let name = &self.product.name;
        match &self.kind {
            ChangeKind::PriceChanged {
                old_price,
                new_price,
            } => format!(
                "{} price changed from {:.2} to {:.2} {}",
                name, old_price, new_price, self.product.currency
            ),
            ChangeKind::Restocked { new_quantity, .. } => {
                format!("{} is back in stock ({} available)", name, new_quantity)
            }
            ChangeKind::SoldOut { .. } => format!("{} sold out", name),
            ChangeKind::NewArrival => format!("{} is a new arrival", name),
            ChangeKind::LimitedRelease => format!("{} is a limited release", name),
        }
    }
}

/// Broadcaster for change events.
pub struct ChangeEventBroadcaster {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeEventBroadcaster {
    /// Create a new broadcaster with default capacity (256).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of receivers it reached.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ChangeEventBroadcaster {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
