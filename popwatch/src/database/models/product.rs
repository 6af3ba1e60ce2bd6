//! Product database models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, ms_to_datetime};
use crate::domain::{ProductSnapshot, ProductState};

/// Latest known state of a catalog item.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProductDbModel {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub discount_price: Option<f64>,
    pub in_stock: bool,
    pub stock_quantity: i64,
    pub is_new: bool,
    pub is_limited: bool,
    pub currency: String,
    pub product_url: Option<String>,
    pub image_url: Option<String>,
    pub brand_name: Option<String>,
    pub series: Option<String>,
    /// Unix epoch milliseconds
    pub first_seen_at: i64,
    /// Unix epoch milliseconds
    pub last_checked_at: i64,
}

impl From<&ProductState> for ProductDbModel {
    fn from(state: &ProductState) -> Self {
        let s = &state.snapshot;
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            price: s.price,
            discount_price: s.discount_price,
            in_stock: s.in_stock,
            stock_quantity: s.stock_quantity,
            is_new: s.is_new,
            is_limited: s.is_limited,
            currency: s.currency.clone(),
            product_url: s.product_url.clone(),
            image_url: s.image_url.clone(),
            brand_name: s.brand_name.clone(),
            series: s.series.clone(),
            first_seen_at: datetime_to_ms(state.first_seen_at),
            last_checked_at: datetime_to_ms(state.last_checked_at),
        }
    }
}

impl From<ProductDbModel> for ProductState {
    fn from(model: ProductDbModel) -> Self {
        Self {
            snapshot: ProductSnapshot {
                id: model.id,
                name: model.name,
                price: model.price,
                discount_price: model.discount_price,
                in_stock: model.in_stock,
                stock_quantity: model.stock_quantity,
                is_new: model.is_new,
                is_limited: model.is_limited,
                currency: model.currency,
                product_url: model.product_url,
                image_url: model.image_url,
                brand_name: model.brand_name,
                series: model.series,
            },
            first_seen_at: ms_to_datetime(model.first_seen_at),
            last_checked_at: ms_to_datetime(model.last_checked_at),
        }
    }
}

/// One recorded price change.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PriceHistoryDbModel {
    /// Assigned by the database; ignored on insert.
    pub id: i64,
    pub product_id: String,
    pub old_price: f64,
    pub new_price: f64,
    /// Unix epoch milliseconds
    pub recorded_at: i64,
}

impl PriceHistoryDbModel {
    pub fn new(
        product_id: impl Into<String>,
        old_price: f64,
        new_price: f64,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            product_id: product_id.into(),
            old_price,
            new_price,
            recorded_at: datetime_to_ms(recorded_at),
        }
    }

    /// Build a row for the difference between two snapshots of one product.
    pub fn between(
        previous: &ProductSnapshot,
        current: &ProductSnapshot,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self::new(&current.id, previous.price, current.price, recorded_at)
    }
}

/// One recorded stock change.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct StockHistoryDbModel {
    /// Assigned by the database; ignored on insert.
    pub id: i64,
    pub product_id: String,
    pub old_in_stock: bool,
    pub new_in_stock: bool,
    pub old_quantity: i64,
    pub new_quantity: i64,
    /// Unix epoch milliseconds
    pub recorded_at: i64,
}

impl StockHistoryDbModel {
    pub fn between(
        previous: &ProductSnapshot,
        current: &ProductSnapshot,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            product_id: current.id.clone(),
            old_in_stock: previous.in_stock,
            new_in_stock: current.in_stock,
            old_quantity: previous.stock_quantity,
            new_quantity: current.stock_quantity,
            recorded_at: datetime_to_ms(recorded_at),
        }
    }
}
