//! popwatch library crate.
//!
//! Watches a retail catalog for new, limited, restocked, sold-out and
//! re-priced items, records every observation and notifies configured
//! channels about changes.

pub mod catalog;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod governor;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod registry;
pub mod scheduler;
pub mod services;
pub mod utils;

pub use error::{Error, Result};
