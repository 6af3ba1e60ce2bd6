//! Access to the upstream product catalog.
//!
//! [`CatalogSource`] is the raw upstream seam; every implementation receives
//! the [`RequestIdentity`] chosen by the governor. Components inside the
//! pipeline talk to [`GovernedCatalog`], which routes each call through the
//! shared [`RequestGovernor`](crate::governor::RequestGovernor).

mod governed;
mod http;

pub use governed::GovernedCatalog;
pub use http::{CatalogConfig, HttpCatalogSource};

use async_trait::async_trait;

use crate::Result;
use crate::domain::ProductSnapshot;
use crate::governor::RequestIdentity;

/// Typed access to the upstream catalog.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Newest items, most recent first.
    async fn list_new(
        &self,
        identity: &RequestIdentity,
        limit: usize,
    ) -> Result<Vec<ProductSnapshot>>;

    /// Items ordered by popularity.
    async fn list_popular(
        &self,
        identity: &RequestIdentity,
        limit: usize,
    ) -> Result<Vec<ProductSnapshot>>;

    /// Limited-edition items. Every returned snapshot has `is_limited` set.
    async fn list_limited(
        &self,
        identity: &RequestIdentity,
        limit: usize,
    ) -> Result<Vec<ProductSnapshot>>;

    /// Keyword search.
    async fn search(
        &self,
        identity: &RequestIdentity,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<ProductSnapshot>>;

    /// Single item by identifier; `None` when the catalog does not know it.
    async fn get_by_id(
        &self,
        identity: &RequestIdentity,
        id: &str,
    ) -> Result<Option<ProductSnapshot>>;
}

#[cfg(test)]
pub(crate) mod testing;
