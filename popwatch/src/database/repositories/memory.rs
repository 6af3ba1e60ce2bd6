//! In-memory product repository used by unit tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::ProductRepository;
use crate::database::models::{PriceHistoryDbModel, StockHistoryDbModel};
use crate::domain::ProductState;
use crate::{Error, Result};

#[derive(Default)]
pub(crate) struct InMemoryProductRepository {
    states: Mutex<HashMap<String, ProductState>>,
    prices: Mutex<Vec<PriceHistoryDbModel>>,
    stocks: Mutex<Vec<StockHistoryDbModel>>,
    failing_ids: Mutex<HashSet<String>>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write for `id` fail.
    pub fn fail_writes_for(&self, id: &str) {
        self.failing_ids.lock().insert(id.to_string());
    }

    pub fn state_count(&self) -> usize {
        self.states.lock().len()
    }

    pub fn price_rows(&self) -> Vec<PriceHistoryDbModel> {
        self.prices.lock().clone()
    }

    pub fn stock_rows(&self) -> Vec<StockHistoryDbModel> {
        self.stocks.lock().clone()
    }

    fn check(&self, id: &str) -> Result<()> {
        if self.failing_ids.lock().contains(id) {
            return Err(Error::Database(format!("write rejected for {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn get_state(&self, id: &str) -> Result<Option<ProductState>> {
        Ok(self.states.lock().get(id).cloned())
    }

    async fn put_state(&self, state: &ProductState) -> Result<()> {
        self.check(state.id())?;
        self.states
            .lock()
            .insert(state.id().to_string(), state.clone());
        Ok(())
    }

    async fn append_price_history(&self, entry: &PriceHistoryDbModel) -> Result<()> {
        self.check(&entry.product_id)?;
        self.prices.lock().push(entry.clone());
        Ok(())
    }

    async fn append_stock_history(&self, entry: &StockHistoryDbModel) -> Result<()> {
        self.check(&entry.product_id)?;
        self.stocks.lock().push(entry.clone());
        Ok(())
    }

    async fn list_products(&self, offset: i64, limit: i64) -> Result<Vec<ProductState>> {
        let mut states: Vec<_> = self.states.lock().values().cloned().collect();
        states.sort_by(|a, b| b.last_checked_at.cmp(&a.last_checked_at).then(a.id().cmp(b.id())));
        Ok(states
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_products(&self) -> Result<i64> {
        Ok(self.states.lock().len() as i64)
    }

    async fn price_history(&self, product_id: &str, limit: i64) -> Result<Vec<PriceHistoryDbModel>> {
        Ok(self
            .prices
            .lock()
            .iter()
            .rev()
            .filter(|row| row.product_id == product_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn stock_history(&self, product_id: &str, limit: i64) -> Result<Vec<StockHistoryDbModel>> {
        Ok(self
            .stocks
            .lock()
            .iter()
            .rev()
            .filter(|row| row.product_id == product_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
