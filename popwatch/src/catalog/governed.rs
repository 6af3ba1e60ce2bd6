use std::sync::Arc;

use tracing::debug;

use super::CatalogSource;
use crate::Result;
use crate::domain::ProductSnapshot;
use crate::governor::RequestGovernor;

/// Catalog access gated by the request governor.
///
/// A call skipped by an open circuit yields an empty result. Upstream errors
/// are recorded by the governor and returned to the caller.
#[derive(Clone)]
pub struct GovernedCatalog {
    source: Arc<dyn CatalogSource>,
    governor: Arc<RequestGovernor>,
}

impl GovernedCatalog {
    pub fn new(source: Arc<dyn CatalogSource>, governor: Arc<RequestGovernor>) -> Self {
        Self { source, governor }
    }

    pub fn governor(&self) -> &Arc<RequestGovernor> {
        &self.governor
    }

    pub async fn list_new(&self, limit: usize) -> Result<Vec<ProductSnapshot>> {
        let outcome = self
            .governor
            .guarded_call(|identity| async move { self.source.list_new(&identity, limit).await })
            .await?;
        Ok(Self::or_empty(outcome.into_option(), "list_new"))
    }

    pub async fn list_popular(&self, limit: usize) -> Result<Vec<ProductSnapshot>> {
        let outcome = self
            .governor
            .guarded_call(|identity| async move { self.source.list_popular(&identity, limit).await })
            .await?;
        Ok(Self::or_empty(outcome.into_option(), "list_popular"))
    }

    pub async fn list_limited(&self, limit: usize) -> Result<Vec<ProductSnapshot>> {
        let outcome = self
            .governor
            .guarded_call(|identity| async move { self.source.list_limited(&identity, limit).await })
            .await?;
        Ok(Self::or_empty(outcome.into_option(), "list_limited"))
    }

    pub async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<ProductSnapshot>> {
        let outcome = self
            .governor
            .guarded_call(|identity| async move {
                self.source.search(&identity, keyword, limit).await
            })
            .await?;
        Ok(Self::or_empty(outcome.into_option(), "search"))
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<ProductSnapshot>> {
        let outcome = self
            .governor
            .guarded_call(|identity| async move { self.source.get_by_id(&identity, id).await })
            .await?;
        match outcome.into_option() {
            Some(found) => Ok(found),
            None => {
                debug!(id, "get_by_id skipped by governor");
                Ok(None)
            }
        }
    }

    fn or_empty(products: Option<Vec<ProductSnapshot>>, operation: &str) -> Vec<ProductSnapshot> {
        products.unwrap_or_else(|| {
            debug!(operation, "Catalog call skipped by governor");
            Vec::new()
        })
    }
}
