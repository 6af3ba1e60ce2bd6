//! Notification events and message templates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::monitor::{ChangeEvent, ChangeKind};

/// Priority level for notifications.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    /// Informational only.
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl std::fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Events that can trigger notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A detected product change.
    ProductChanged(ChangeEvent),
    /// Operator-triggered channel test.
    SystemTest { timestamp: DateTime<Utc> },
}

fn format_price(value: f64) -> String {
    format!("{:.2}", value)
}

impl NotificationEvent {
    pub fn test_event() -> Self {
        Self::SystemTest {
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ProductChanged(change) => change.event_type(),
            Self::SystemTest { .. } => "system_test",
        }
    }

    pub fn priority(&self) -> NotificationPriority {
        match self {
            Self::ProductChanged(change) => match change.kind {
                ChangeKind::Restocked { .. } | ChangeKind::LimitedRelease => {
                    NotificationPriority::High
                }
                ChangeKind::PriceChanged { .. } | ChangeKind::NewArrival => {
                    NotificationPriority::Normal
                }
                ChangeKind::SoldOut { .. } => NotificationPriority::Low,
            },
            Self::SystemTest { .. } => NotificationPriority::Normal,
        }
    }

    pub fn title(&self) -> String {
        match self {
            Self::ProductChanged(change) => match change.kind {
                ChangeKind::Restocked { .. } => "Back in stock".to_string(),
                ChangeKind::SoldOut { .. } => "Sold out".to_string(),
                ChangeKind::PriceChanged { .. } => "Price changed".to_string(),
                ChangeKind::NewArrival => "New arrival".to_string(),
                ChangeKind::LimitedRelease => "Limited release".to_string(),
            },
            Self::SystemTest { .. } => "Test notification".to_string(),
        }
    }

    /// Message body, one fact per line.
    pub fn description(&self) -> String {
        let change = match self {
            Self::ProductChanged(change) => change,
            Self::SystemTest { .. } => {
                return "Notification channels are configured correctly.".to_string();
            }
        };

        let product = &change.product;
        let currency = &product.currency;
        let mut lines = Vec::new();

        match change.kind {
            ChangeKind::Restocked { .. } => {
                lines.push(format!("{} is available again!", product.name));
                lines.push(format!("Price: {} {}", format_price(product.price), currency));
                lines.push(format!("Stock: {}", product.stock_quantity));
            }
            ChangeKind::SoldOut { .. } => {
                lines.push(format!("{} has sold out.", product.name));
                lines.push(format!("Price: {} {}", format_price(product.price), currency));
            }
            ChangeKind::PriceChanged {
                old_price,
                new_price,
            } => {
                lines.push(format!("{} changed price.", product.name));
                lines.push(format!("Old price: {} {}", format_price(old_price), currency));
                lines.push(format!("New price: {} {}", format_price(new_price), currency));
                let amount = change.change_amount().unwrap_or_default();
                match change.change_percentage() {
                    Some(pct) => lines.push(format!(
                        "Change: {:+.2} {} ({:+.2}%)",
                        amount, currency, pct
                    )),
                    None => lines.push(format!("Change: {:+.2} {}", amount, currency)),
                }
            }
            ChangeKind::NewArrival => {
                lines.push(format!("{} just arrived!", product.name));
                lines.push(format!("Price: {} {}", format_price(product.price), currency));
                lines.push(format!("Stock: {}", product.stock_quantity));
            }
            ChangeKind::LimitedRelease => {
                lines.push(format!("Limited item {} is on sale!", product.name));
                lines.push(format!("Price: {} {}", format_price(product.price), currency));
                lines.push(format!("Stock: {}", product.stock_quantity));
            }
        }

        match (&product.brand_name, &product.series) {
            (Some(brand), Some(series)) => lines.push(format!("Series: {} / {}", brand, series)),
            (Some(brand), None) => lines.push(format!("Brand: {}", brand)),
            (None, Some(series)) => lines.push(format!("Series: {}", series)),
            (None, None) => {}
        }
        if let Some(url) = &product.product_url {
            lines.push(format!("Link: {}", url));
        }

        lines.join("\n")
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ProductChanged(change) => change.detected_at,
            Self::SystemTest { timestamp } => *timestamp,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::ProductChanged(change) => change.product.product_url.as_deref(),
            Self::SystemTest { .. } => None,
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match self {
            Self::ProductChanged(change) => change.product.image_url.as_deref(),
            Self::SystemTest { .. } => None,
        }
    }
}
