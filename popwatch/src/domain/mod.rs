//! Core value types shared by every component.

mod product;
mod watch;

pub use product::{DEFAULT_CURRENCY, ProductSnapshot, ProductState};
pub use watch::WatchEntry;
