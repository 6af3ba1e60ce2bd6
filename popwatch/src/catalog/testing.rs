//! In-memory catalog used by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::CatalogSource;
use crate::domain::ProductSnapshot;
use crate::governor::RequestIdentity;
use crate::{Error, Result};

#[derive(Default)]
pub(crate) struct FakeCatalog {
    new_items: Mutex<Vec<ProductSnapshot>>,
    popular: Mutex<Vec<ProductSnapshot>>,
    limited: Mutex<Vec<ProductSnapshot>>,
    catalog: Mutex<Vec<ProductSnapshot>>,
    search_overrides: Mutex<HashMap<String, Vec<ProductSnapshot>>>,
    failing: AtomicBool,
    malformed_ids: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_new(&self, product: ProductSnapshot) {
        self.new_items.lock().push(product);
    }

    pub fn add_popular(&self, product: ProductSnapshot) {
        self.popular.lock().push(product);
    }

    pub fn add_limited(&self, product: ProductSnapshot) {
        self.limited.lock().push(product);
    }

    /// Items reachable through `search` and `get_by_id`.
    pub fn add_catalog(&self, product: ProductSnapshot) {
        self.catalog.lock().push(product);
    }

    pub fn set_new(&self, products: Vec<ProductSnapshot>) {
        *self.new_items.lock() = products;
    }

    pub fn set_search_override(&self, keyword: &str, products: Vec<ProductSnapshot>) {
        self.search_overrides
            .lock()
            .insert(keyword.to_string(), products);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// `get_by_id` for this id fails with a non-transient error.
    pub fn set_malformed(&self, id: &str) {
        self.malformed_ids.lock().push(id.to_string());
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == operation).count()
    }

    fn enter(&self, operation: &str) -> Result<()> {
        self.calls.lock().push(operation.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::upstream(503, "fake outage"));
        }
        Ok(())
    }
}

fn take(products: &[ProductSnapshot], limit: usize) -> Vec<ProductSnapshot> {
    products.iter().take(limit).cloned().collect()
}

#[async_trait]
impl CatalogSource for FakeCatalog {
    async fn list_new(&self, _: &RequestIdentity, limit: usize) -> Result<Vec<ProductSnapshot>> {
        self.enter("list_new")?;
        Ok(take(&self.new_items.lock(), limit))
    }

    async fn list_popular(
        &self,
        _: &RequestIdentity,
        limit: usize,
    ) -> Result<Vec<ProductSnapshot>> {
        self.enter("list_popular")?;
        Ok(take(&self.popular.lock(), limit))
    }

    async fn list_limited(
        &self,
        _: &RequestIdentity,
        limit: usize,
    ) -> Result<Vec<ProductSnapshot>> {
        self.enter("list_limited")?;
        Ok(take(&self.limited.lock(), limit))
    }

    async fn search(
        &self,
        _: &RequestIdentity,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<ProductSnapshot>> {
        self.enter("search")?;
        if let Some(products) = self.search_overrides.lock().get(keyword) {
            return Ok(take(products, limit));
        }
        let keyword = keyword.to_lowercase();
        Ok(self
            .catalog
            .lock()
            .iter()
            .filter(|p| p.name.to_lowercase().contains(&keyword))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, _: &RequestIdentity, id: &str) -> Result<Option<ProductSnapshot>> {
        self.enter("get_by_id")?;
        if self.malformed_ids.lock().iter().any(|m| m == id) {
            return Err(Error::Other(format!("malformed record for {id}")));
        }
        Ok(self.catalog.lock().iter().find(|p| p.id == id).cloned())
    }
}
