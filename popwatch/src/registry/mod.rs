//! Monitored-item registry.
//!
//! Holds the human-entered watch list and resolves each entry to a catalog
//! identifier, falling back to token-based fuzzy matching.

mod config;
mod index;
mod service;

pub use config::{DEFAULT_RESOLUTION_BRANDS, DEFAULT_WATCH_LIST, RegistryConfig};
pub use service::WatchRegistry;
