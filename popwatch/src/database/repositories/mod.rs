//! Repository layer for database access.

mod product;

#[cfg(test)]
pub(crate) mod memory;

pub use product::{ProductRepository, SqlxProductRepository};
