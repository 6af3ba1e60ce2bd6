//! Service layer module.
//!
//! This module provides the service container that wires the components
//! together and exposes the operator-facing operations.

pub mod container;

pub use container::{ProductPage, ServiceContainer};
