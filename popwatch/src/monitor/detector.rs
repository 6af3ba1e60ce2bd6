//! Change detection between a stored snapshot and a fresh observation.

use chrono::{DateTime, Utc};

use super::events::{ChangeEvent, ChangeKind};
use crate::domain::ProductSnapshot;

/// Absolute price difference ignored as noise.
pub const PRICE_TOLERANCE: f64 = 0.01;

/// Result of comparing one observation against the stored snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    pub events: Vec<ChangeEvent>,
    /// A price history row is due.
    pub price_changed: bool,
    /// A stock history row is due.
    pub stock_changed: bool,
}

impl Detection {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && !self.price_changed && !self.stock_changed
    }
}

/// Compare `current` against `previous`.
///
/// A product seen for the first time can only raise new-arrival or
/// limited-release events. Several kinds may fire for one observation.
pub fn detect_changes(
    previous: Option<&ProductSnapshot>,
    current: &ProductSnapshot,
    now: DateTime<Utc>,
) -> Detection {
    let mut detection = Detection::default();
    let mut emit = |kind: ChangeKind| {
        detection
            .events
            .push(ChangeEvent::new(kind, current.clone(), now))
    };

    let Some(previous) = previous else {
        if current.is_new {
            emit(ChangeKind::NewArrival);
        }
        if current.is_limited {
            emit(ChangeKind::LimitedRelease);
        }
        return detection;
    };

    let price_changed = (current.price - previous.price).abs() > PRICE_TOLERANCE;
    if price_changed {
        emit(ChangeKind::PriceChanged {
            old_price: previous.price,
            new_price: current.price,
        });
    }

    let stock_changed = previous.in_stock != current.in_stock
        || previous.stock_quantity != current.stock_quantity;
    match (previous.in_stock, current.in_stock) {
        (false, true) => emit(ChangeKind::Restocked {
            old_quantity: previous.stock_quantity,
            new_quantity: current.stock_quantity,
        }),
        (true, false) => emit(ChangeKind::SoldOut {
            old_quantity: previous.stock_quantity,
            new_quantity: current.stock_quantity,
        }),
        _ => {}
    }

    if current.is_new && !previous.is_new {
        emit(ChangeKind::NewArrival);
    }
    if current.is_limited && !previous.is_limited {
        emit(ChangeKind::LimitedRelease);
    }

    detection.price_changed = price_changed;
    detection.stock_changed = stock_changed;
    detection
}
