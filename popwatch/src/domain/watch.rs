use serde::{Deserialize, Serialize};

/// A user-specified item of interest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEntry {
    pub name: String,
    pub product_id: Option<String>,
}

impl WatchEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            product_id: None,
        }
    }

    pub fn resolved(name: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            product_id: Some(product_id.into()),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.product_id.is_some()
    }
}
