//! Request governor.
//!
//! Every outbound catalog call goes through the [`RequestGovernor`], which
//! applies a randomized, error-scaled delay, rotates the client identity and
//! stops calling upstream entirely for a cool-down window after repeated
//! failures.

mod config;
mod service;

pub use config::{DEFAULT_USER_AGENTS, GovernorConfig};
pub use service::{Governed, GovernorStats, RequestGovernor, RequestIdentity, backoff_multiplier};
