use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Series watched out of the box.
pub const DEFAULT_WATCH_LIST: &[&str] = &[
    "SKULLPANDA 溫度系列",
    "MOLLY 幻想大亨系列",
    "DIMOO 迷失在太空系列",
    "LABUBU 太空旅行系列",
    "PUCKY 森林精靈系列",
    "HIRONO 夢幻星球系列",
];

/// Brands searched when building the name index.
pub const DEFAULT_RESOLUTION_BRANDS: &[&str] =
    &["SKULLPANDA", "MOLLY", "DIMOO", "LABUBU", "PUCKY", "HIRONO"];

/// Configuration for the watch registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Watch list the registry starts with.
    pub watch_list: Vec<String>,
    /// Brands searched while building the name index.
    pub resolution_brands: Vec<String>,
    /// Page size of the newest and popular listings used for the index.
    pub index_listing_limit: usize,
    /// Result limit of each brand search used for the index.
    pub brand_search_limit: usize,
    /// Result limit of searches made by `add` and unresolved fetches.
    pub lookup_search_limit: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            watch_list: DEFAULT_WATCH_LIST.iter().map(|s| s.to_string()).collect(),
            resolution_brands: DEFAULT_RESOLUTION_BRANDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            index_listing_limit: 100,
            brand_search_limit: 20,
            lookup_search_limit: 5,
        }
    }
}

impl RegistryConfig {
    /// Config with an empty watch list.
    pub fn empty() -> Self {
        Self {
            watch_list: Vec::new(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.index_listing_limit == 0 || self.brand_search_limit == 0 || self.lookup_search_limit == 0 {
            return Err(Error::validation("registry limits must be greater than zero"));
        }
        if self.watch_list.iter().any(|name| name.trim().is_empty()) {
            return Err(Error::validation("watch list entries must not be blank"));
        }
        Ok(())
    }
}
