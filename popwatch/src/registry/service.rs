use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::config::RegistryConfig;
use super::index::{CatalogIndex, names_overlap, names_overlap_ignore_case};
use crate::Result;
use crate::catalog::GovernedCatalog;
use crate::domain::{ProductSnapshot, WatchEntry};

#[derive(Debug, Default)]
struct RegistryState {
    entries: Vec<WatchEntry>,
    index: Option<CatalogIndex>,
}

/// Watch list with catalog resolution.
pub struct WatchRegistry {
    catalog: GovernedCatalog,
    config: RegistryConfig,
    state: RwLock<RegistryState>,
}

impl WatchRegistry {
    pub fn new(catalog: GovernedCatalog, config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        let entries = config
            .watch_list
            .iter()
            .map(|name| WatchEntry::new(name.clone()))
            .collect();
        Ok(Self {
            catalog,
            config,
            state: RwLock::new(RegistryState {
                entries,
                index: None,
            }),
        })
    }

    /// Watched names in insertion order.
    pub fn list(&self) -> Vec<String> {
        self.state
            .read()
            .entries
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Watch entries with their resolved identifiers.
    pub fn entries(&self) -> Vec<WatchEntry> {
        self.state.read().entries.clone()
    }

    /// Collect a fresh name index from the newest and popular listings and
    /// one search per configured brand. Transient failures leave a gap.
    async fn build_index(&self) -> Result<CatalogIndex> {
        let limit = self.config.index_listing_limit;
        let mut products: Vec<ProductSnapshot> = Vec::new();

        match self.catalog.list_new(limit).await {
            Ok(batch) => products.extend(batch),
            Err(e) if e.is_transient() => warn!(error = %e, "Newest listing unavailable for index"),
            Err(e) => return Err(e),
        }
        match self.catalog.list_popular(limit).await {
            Ok(batch) => products.extend(batch),
            Err(e) if e.is_transient() => warn!(error = %e, "Popular listing unavailable for index"),
            Err(e) => return Err(e),
        }
        for brand in &self.config.resolution_brands {
            match self.catalog.search(brand, self.config.brand_search_limit).await {
                Ok(batch) => products.extend(batch),
                Err(e) if e.is_transient() => {
                    warn!(brand = %brand, error = %e, "Brand search unavailable for index")
                }
                Err(e) => return Err(e),
            }
        }

        let index = CatalogIndex::from_products(&products);
        info!(names = index.len(), "Built catalog name index");
        Ok(index)
    }

    /// Resolve each name to a catalog identifier.
    ///
    /// Exact catalog names win; otherwise the first catalog name containing
    /// any token of the watched name is used. Misses are logged and left out
    /// of the result. Watch entries with matching names pick up the ids.
    pub async fn resolve(&self, watch_list: &[String]) -> Result<HashMap<String, String>> {
        let index = self.build_index().await?;

        let mut resolved = HashMap::new();
        let mut missing = Vec::new();
        for name in watch_list {
            if let Some(id) = index.exact(name) {
                resolved.insert(name.clone(), id.to_string());
            } else if let Some((candidate, id)) = index.fuzzy(name) {
                info!(name = %name, candidate, id, "Fuzzy-matched watch entry");
                resolved.insert(name.clone(), id.to_string());
            } else {
                missing.push(name.as_str());
            }
        }
        if !missing.is_empty() {
            warn!(?missing, "Watch entries without a catalog match");
        }

        let mut state = self.state.write();
        for entry in state.entries.iter_mut() {
            if !entry.is_resolved()
                && let Some(id) = resolved.get(&entry.name)
            {
                entry.product_id = Some(id.clone());
            }
        }
        state.index = Some(index);

        Ok(resolved)
    }

    /// Fetch current snapshots for every watch entry.
    ///
    /// Resolves the watch list while no catalog names are indexed. Entries
    /// still unresolved are looked up by searching the first token of their
    /// name; a hit is remembered for later runs. A failure for one entry is
    /// logged and the entry skipped.
    pub async fn fetch_watched(&self) -> Result<Vec<ProductSnapshot>> {
        if self.state.read().entries.is_empty() {
            return Ok(Vec::new());
        }
        let needs_index = self
            .state
            .read()
            .index
            .as_ref()
            .is_none_or(|index| index.len() == 0);
        if needs_index {
            let names = self.list();
            self.resolve(&names).await?;
        }

        let entries = self.entries();
        let mut products = Vec::with_capacity(entries.len());

        for entry in entries {
            let fetched = match entry.product_id.as_deref() {
                Some(id) => self.fetch_resolved(&entry.name, id).await,
                None => self.fetch_unresolved(&entry.name).await,
            };
            match fetched {
                Ok(Some(product)) => products.push(product),
                Ok(None) => {}
                Err(e) => warn!(name = %entry.name, error = %e, "Failed to fetch watched item, skipping"),
            }
        }

        debug!(count = products.len(), "Fetched watched items");
        Ok(products)
    }

    async fn fetch_resolved(&self, name: &str, id: &str) -> Result<Option<ProductSnapshot>> {
        let product = self.catalog.get_by_id(id).await?;
        if product.is_none() {
            warn!(name, id, "Watched item not found; it may have been delisted");
        }
        Ok(product)
    }

    async fn fetch_unresolved(&self, name: &str) -> Result<Option<ProductSnapshot>> {
        let Some(token) = name.split_whitespace().next() else {
            return Ok(None);
        };

        let results = self
            .catalog
            .search(token, self.config.lookup_search_limit)
            .await?;
        if results.is_empty() {
            warn!(name, token, "Search returned nothing for unresolved watch entry");
            return Ok(None);
        }

        let token_lower = token.to_lowercase();
        let Some(best) = results
            .into_iter()
            .find(|product| product.name.to_lowercase().contains(&token_lower))
        else {
            warn!(name, token, "No search result matches unresolved watch entry");
            return Ok(None);
        };

        info!(name, found = %best.name, id = %best.id, "Resolved watch entry by search");
        let mut state = self.state.write();
        if let Some(entry) = state.entries.iter_mut().find(|e| e.name == name) {
            entry.product_id = Some(best.id.clone());
        }
        Ok(Some(best))
    }

    /// Add a watch entry.
    ///
    /// Succeeds without change when the name overlaps an existing entry.
    /// Otherwise searches the catalog and appends the best-matching result
    /// under its catalog name. Returns `false` for blank names or when the
    /// search fails or finds nothing.
    pub async fn add(&self, name: &str) -> Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            warn!("Refusing to add blank watch entry");
            return Ok(false);
        }

        if let Some(existing) = self.find_overlapping(name) {
            info!(name, existing = %existing, "Item already watched");
            return Ok(true);
        }

        let results = match self.catalog.search(name, self.config.lookup_search_limit).await {
            Ok(results) => results,
            Err(e) => {
                warn!(name, error = %e, "Catalog search failed for watch entry");
                return Ok(false);
            }
        };
        let Some(best) = results
            .iter()
            .find(|product| names_overlap_ignore_case(name, &product.name))
            .or_else(|| results.first())
        else {
            warn!(name, "No catalog item found for watch entry");
            return Ok(false);
        };

        let mut state = self.state.write();
        if state.entries.iter().any(|e| e.name == best.name) {
            info!(name, existing = %best.name, "Item already watched");
            return Ok(true);
        }
        state
            .entries
            .push(WatchEntry::resolved(best.name.clone(), best.id.clone()));
        if let Some(index) = state.index.as_mut() {
            index.insert(&best.name, &best.id);
        }
        info!(name = %best.name, id = %best.id, "Added watch entry");
        Ok(true)
    }

    /// Remove a watch entry by exact name, else by the first overlapping name.
    pub fn remove(&self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            warn!("Refusing to remove blank watch entry");
            return false;
        }

        let mut state = self.state.write();
        let position = state
            .entries
            .iter()
            .position(|e| e.name == name)
            .or_else(|| {
                state
                    .entries
                    .iter()
                    .position(|e| names_overlap(name, &e.name))
            });

        match position {
            Some(idx) => {
                let removed = state.entries.remove(idx);
                info!(name = %removed.name, requested = name, "Removed watch entry");
                true
            }
            None => {
                warn!(name, "Watch entry not found");
                false
            }
        }
    }

    fn find_overlapping(&self, name: &str) -> Option<String> {
        let state = self.state.read();
        state
            .entries
            .iter()
            .find(|e| e.name == name)
            .or_else(|| state.entries.iter().find(|e| names_overlap(name, &e.name)))
            .map(|e| e.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::FakeCatalog;
    use crate::governor::{GovernorConfig, RequestGovernor};
    use std::sync::Arc;

    fn registry(fake: Arc<FakeCatalog>, config: RegistryConfig) -> WatchRegistry {
        let governor = Arc::new(RequestGovernor::new(GovernorConfig::without_delays()).unwrap());
        WatchRegistry::new(GovernedCatalog::new(fake, governor), config).unwrap()
    }

    fn watch(names: &[&str]) -> RegistryConfig {
        RegistryConfig {
            watch_list: names.iter().map(|s| s.to_string()).collect(),
            ..RegistryConfig::default()
        }
    }

    #[tokio::test]
    async fn test_add_then_fuzzy_remove() {
        let fake = Arc::new(FakeCatalog::new());
        fake.add_catalog(ProductSnapshot::new("m1", "MOLLY 海洋系列", 89.0));
        let registry = registry(fake, RegistryConfig::empty());

        assert!(registry.add("MOLLY 海洋系列").await.unwrap());
        assert_eq!(registry.list(), vec!["MOLLY 海洋系列".to_string()]);
        assert_eq!(registry.entries()[0].product_id.as_deref(), Some("m1"));

        assert!(registry.remove("MOLLY"));
        assert!(registry.list().is_empty());
    }

    #[tokio::test]
    async fn test_add_existing_overlap_is_noop() {
        let fake = Arc::new(FakeCatalog::new());
        let registry = registry(fake.clone(), watch(&["DIMOO 迷失在太空系列"]));

        assert!(registry.add("DIMOO").await.unwrap());
        assert_eq!(registry.list().len(), 1);
        assert_eq!(fake.call_count("search"), 0);
    }

    #[tokio::test]
    async fn test_add_falls_back_to_first_result() {
        let fake = Arc::new(FakeCatalog::new());
        fake.add_catalog(ProductSnapshot::new("h1", "HIRONO 小野 The Other One", 99.0));
        fake.set_search_override("hirono mime", vec![ProductSnapshot::new("h1", "HIRONO 小野 The Other One", 99.0)]);
        let registry = registry(fake, RegistryConfig::empty());

        assert!(registry.add("hirono mime").await.unwrap());
        assert_eq!(registry.list(), vec!["HIRONO 小野 The Other One".to_string()]);
    }

    #[tokio::test]
    async fn test_add_fails_without_results_or_name() {
        let fake = Arc::new(FakeCatalog::new());
        let registry = registry(fake, RegistryConfig::empty());

        assert!(!registry.add("UNKNOWN 系列").await.unwrap());
        assert!(!registry.add("   ").await.unwrap());
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_remove_exact_before_fuzzy() {
        let fake = Arc::new(FakeCatalog::new());
        let registry = registry(fake, watch(&["MOLLY 幻想大亨系列", "MOLLY"]));

        assert!(registry.remove("MOLLY"));
        assert_eq!(registry.list(), vec!["MOLLY 幻想大亨系列".to_string()]);
        assert!(!registry.remove("LABUBU"));
        assert!(!registry.remove(""));
    }

    #[tokio::test]
    async fn test_resolve_exact_and_fuzzy() {
        let fake = Arc::new(FakeCatalog::new());
        fake.add_new(ProductSnapshot::new("1", "SKULLPANDA 溫度系列", 79.0));
        fake.add_popular(ProductSnapshot::new("2", "LABUBU 心心相印", 99.0));
        let registry = registry(
            fake,
            watch(&["SKULLPANDA 溫度系列", "LABUBU 太空旅行系列", "PUCKY 森林精靈系列"]),
        );

        let resolved = registry.resolve(&registry.list()).await.unwrap();
        assert_eq!(resolved.get("SKULLPANDA 溫度系列").map(String::as_str), Some("1"));
        assert_eq!(resolved.get("LABUBU 太空旅行系列").map(String::as_str), Some("2"));
        assert!(!resolved.contains_key("PUCKY 森林精靈系列"));

        let entries = registry.entries();
        assert_eq!(entries[0].product_id.as_deref(), Some("1"));
        assert!(entries[2].product_id.is_none());
    }

    #[tokio::test]
    async fn test_fetch_watched_searches_unresolved_entries() {
        let fake = Arc::new(FakeCatalog::new());
        fake.add_new(ProductSnapshot::new("1", "SKULLPANDA 溫度系列", 79.0));
        fake.add_catalog(ProductSnapshot::new("1", "SKULLPANDA 溫度系列", 79.0));
        fake.add_catalog(ProductSnapshot::new("9", "Pucky Forest Fairy", 69.0));
        let registry = registry(fake, watch(&["SKULLPANDA 溫度系列", "PUCKY 森林精靈系列"]));

        let products = registry.fetch_watched().await.unwrap();
        let ids: Vec<_> = products.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "9"]);
        assert_eq!(registry.entries()[1].product_id.as_deref(), Some("9"));
    }

    #[tokio::test]
    async fn test_fetch_watched_tolerates_upstream_errors() {
        let fake = Arc::new(FakeCatalog::new());
        fake.set_failing(true);
        let registry = registry(fake, watch(&["MOLLY 幻想大亨系列"]));

        let products = registry.fetch_watched().await.unwrap();
        assert!(products.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_watched_skips_malformed_entry() {
        let fake = Arc::new(FakeCatalog::new());
        fake.add_new(ProductSnapshot::new("1", "SKULLPANDA 溫度系列", 79.0));
        fake.add_new(ProductSnapshot::new("2", "MOLLY 幻想大亨系列", 89.0));
        fake.add_catalog(ProductSnapshot::new("1", "SKULLPANDA 溫度系列", 79.0));
        fake.add_catalog(ProductSnapshot::new("2", "MOLLY 幻想大亨系列", 89.0));
        fake.set_malformed("1");
        let registry = registry(fake, watch(&["SKULLPANDA 溫度系列", "MOLLY 幻想大亨系列"]));

        let products = registry.fetch_watched().await.unwrap();
        let ids: Vec<_> = products.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["2"]);
    }

    #[tokio::test]
    async fn test_fetch_watched_rebuilds_index_after_outage() {
        let fake = Arc::new(FakeCatalog::new());
        fake.set_failing(true);
        let registry = registry(fake.clone(), watch(&["SKULLPANDA 溫度系列"]));
        assert!(registry.fetch_watched().await.unwrap().is_empty());
        assert_eq!(fake.call_count("list_new"), 1);

        fake.set_failing(false);
        fake.add_new(ProductSnapshot::new("1", "SKULLPANDA 溫度系列", 79.0));
        fake.add_catalog(ProductSnapshot::new("1", "SKULLPANDA 溫度系列", 79.0));

        let products = registry.fetch_watched().await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(fake.call_count("list_new"), 2);
        assert_eq!(registry.entries()[0].product_id.as_deref(), Some("1"));

        registry.fetch_watched().await.unwrap();
        assert_eq!(fake.call_count("list_new"), 2);
    }

    #[tokio::test]
    async fn test_add_during_outage_returns_false() {
        let fake = Arc::new(FakeCatalog::new());
        fake.set_failing(true);
        let registry = registry(fake, RegistryConfig::empty());

        assert!(!registry.add("MOLLY").await.unwrap());
        assert!(registry.list().is_empty());
    }
}
