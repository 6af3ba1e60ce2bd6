use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Desktop browser user agents rotated when no custom list is configured.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Configuration for the request governor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// When disabled no delay is applied and calls are never skipped.
    pub enabled: bool,
    /// Lower bound of the randomized pre-request delay, in seconds.
    pub min_interval_secs: f64,
    /// Upper bound of the randomized pre-request delay, in seconds.
    pub max_interval_secs: f64,
    /// Consecutive errors that open the circuit.
    pub max_errors: u32,
    /// Cool-down after the last error before calls resume, in seconds.
    pub recovery_time_secs: u64,
    /// Proxies rotated round-robin; empty means direct connections.
    pub proxy_list: Vec<String>,
    /// User agents picked uniformly at random per request.
    pub user_agents: Vec<String>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_secs: 30.0,
            max_interval_secs: 300.0,
            max_errors: 5,
            recovery_time_secs: 3600,
            proxy_list: Vec::new(),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl GovernorConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.min_interval_secs.is_finite() || self.min_interval_secs < 0.0 {
            return Err(Error::validation(
                "min_interval_secs must be a non-negative number",
            ));
        }
        if !self.max_interval_secs.is_finite() || self.max_interval_secs < self.min_interval_secs {
            return Err(Error::validation(
                "max_interval_secs must be greater than or equal to min_interval_secs",
            ));
        }
        if self.max_errors == 0 {
            return Err(Error::validation("max_errors must be at least 1"));
        }
        for proxy in &self.proxy_list {
            if proxy.trim().is_empty() {
                return Err(Error::validation(format!("invalid proxy entry: {proxy:?}")));
            }
            reqwest::Proxy::all(proxy.as_str()).map_err(|e| {
                Error::validation(format!("invalid proxy entry {proxy:?}: {e}"))
            })?;
        }
        Ok(())
    }

    /// Config with no delays, for tests and local runs.
    pub fn without_delays() -> Self {
        Self {
            min_interval_secs: 0.0,
            max_interval_secs: 0.0,
            enabled: false,
            ..Self::default()
        }
    }
}
