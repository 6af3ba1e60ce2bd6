use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default currency reported by the catalog.
pub const DEFAULT_CURRENCY: &str = "HKD";

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_in_stock() -> bool {
    true
}

/// One observed state of a catalog item.
///
/// The catalog source maps raw records into this type. The serde form is the
/// stored and broadcast shape; unknown fields are ignored, optional fields
/// default and a missing `in_stock` reads as in stock like a raw record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub discount_price: Option<f64>,
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
    #[serde(default)]
    pub stock_quantity: i64,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub is_limited: bool,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub product_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub brand_name: Option<String>,
    #[serde(default)]
    pub series: Option<String>,
}

impl ProductSnapshot {
    /// Minimal snapshot, mostly useful for tests and fakes.
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            discount_price: None,
            in_stock: false,
            stock_quantity: 0,
            is_new: false,
            is_limited: false,
            currency: default_currency(),
            product_url: None,
            image_url: None,
            brand_name: None,
            series: None,
        }
    }

    pub fn with_stock(mut self, in_stock: bool, quantity: i64) -> Self {
        self.in_stock = in_stock;
        self.stock_quantity = quantity;
        self
    }

    pub fn with_flags(mut self, is_new: bool, is_limited: bool) -> Self {
        self.is_new = is_new;
        self.is_limited = is_limited;
        self
    }
}

/// Last-known snapshot of a product plus bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductState {
    pub snapshot: ProductSnapshot,
    pub first_seen_at: DateTime<Utc>,
    pub last_checked_at: DateTime<Utc>,
}

impl ProductState {
    /// State for a product seen for the first time.
    pub fn first_seen(snapshot: ProductSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            snapshot,
            first_seen_at: now,
            last_checked_at: now,
        }
    }

    /// Successor state carrying over the first-seen timestamp.
    pub fn advance(&self, snapshot: ProductSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            snapshot,
            first_seen_at: self.first_seen_at,
            last_checked_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.snapshot.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_deserialize_defaults() {
        let json = r#"{"id":"p1","name":"MOLLY","price":89.0,"unknown":1}"#;
        let snapshot: ProductSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.id, "p1");
        assert_eq!(snapshot.currency, "HKD");
        assert!(snapshot.in_stock);
        assert!(snapshot.discount_price.is_none());

        let sold_out: ProductSnapshot =
            serde_json::from_str(r#"{"id":"p2","name":"DIMOO","in_stock":false}"#).unwrap();
        assert!(!sold_out.in_stock);
        assert_eq!(sold_out.price, 0.0);
    }

    #[test]
    fn test_advance_keeps_first_seen() {
        let t0 = Utc::now();
        let state = ProductState::first_seen(ProductSnapshot::new("p1", "A", 1.0), t0);
        let t1 = t0 + chrono::Duration::seconds(30);
        let next = state.advance(ProductSnapshot::new("p1", "A", 2.0), t1);
        assert_eq!(next.first_seen_at, t0);
        assert_eq!(next.last_checked_at, t1);
    }
}
