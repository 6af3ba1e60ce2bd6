//! Database models.

mod product;

pub use product::{PriceHistoryDbModel, ProductDbModel, StockHistoryDbModel};
