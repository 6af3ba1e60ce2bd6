use std::collections::HashMap;

use crate::domain::ProductSnapshot;

/// Catalog name to identifier index, in first-seen order.
#[derive(Debug, Default, Clone)]
pub(super) struct CatalogIndex {
    names: Vec<String>,
    ids: HashMap<String, String>,
}

impl CatalogIndex {
    /// Index the given products. A repeated name keeps its first position but
    /// takes the latest identifier.
    pub fn from_products<'a>(products: impl IntoIterator<Item = &'a ProductSnapshot>) -> Self {
        let mut index = Self::default();
        for product in products {
            index.insert(&product.name, &product.id);
        }
        index
    }

    pub fn insert(&mut self, name: &str, id: &str) {
        if self.ids.insert(name.to_string(), id.to_string()).is_none() {
            self.names.push(name.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn exact(&self, name: &str) -> Option<&str> {
        self.ids.get(name).map(String::as_str)
    }

    /// First indexed name containing any whitespace-delimited token of `name`.
    pub fn fuzzy(&self, name: &str) -> Option<(&str, &str)> {
        let tokens: Vec<&str> = name.split_whitespace().collect();
        self.names
            .iter()
            .find(|candidate| tokens.iter().any(|token| candidate.contains(token)))
            .and_then(|candidate| {
                self.ids
                    .get(candidate)
                    .map(|id| (candidate.as_str(), id.as_str()))
            })
    }
}

/// Substring containment in either direction.
pub(super) fn names_overlap(a: &str, b: &str) -> bool {
    a.contains(b) || b.contains(a)
}

/// Case-insensitive substring containment in either direction.
pub(super) fn names_overlap_ignore_case(a: &str, b: &str) -> bool {
    names_overlap(&a.to_lowercase(), &b.to_lowercase())
}
