use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::config::GovernorConfig;
use crate::Result;

/// Upper bound of the error-driven delay multiplier.
const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;

/// Relative jitter applied to every computed delay.
const JITTER_FRACTION: f64 = 0.1;

/// Smallest delay applied while the governor is enabled.
const MIN_DELAY_SECS: f64 = 1.0;

/// Delay multiplier for a given consecutive error count: `min(2^e, 10)`.
pub fn backoff_multiplier(error_count: u32) -> f64 {
    if error_count == 0 {
        return 1.0;
    }
    2f64.powi(error_count.min(16) as i32).min(MAX_BACKOFF_MULTIPLIER)
}

/// Delay for the given samples, each in `[0, 1)`.
///
/// `uniform` picks the base delay inside the configured interval and `jitter`
/// perturbs the scaled result by up to ±10%.
fn scaled_delay(config: &GovernorConfig, error_count: u32, uniform: f64, jitter: f64) -> Duration {
    let span = config.max_interval_secs - config.min_interval_secs;
    let base = config.min_interval_secs + span * uniform;
    let scaled = base * backoff_multiplier(error_count);
    let jittered = scaled * (1.0 + JITTER_FRACTION * (2.0 * jitter - 1.0));
    Duration::from_secs_f64(jittered.max(MIN_DELAY_SECS))
}

/// Client identity used for one outbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestIdentity {
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
}

/// Outcome of a governed call that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Governed<T> {
    /// The call was made and returned a value.
    Completed(T),
    /// The circuit is open; upstream was not contacted.
    Skipped,
}

impl<T> Governed<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

#[derive(Debug, Default)]
struct GovernorState {
    error_count: u32,
    last_error_at: Option<Instant>,
    last_error_time: Option<DateTime<Utc>>,
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    last_request_time: Option<DateTime<Utc>>,
    proxy_cursor: usize,
}

/// Snapshot of governor counters and configuration.
#[derive(Debug, Clone, Serialize)]
pub struct GovernorStats {
    pub enabled: bool,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Percentage of successful requests, rounded to two decimals.
    pub success_rate: f64,
    pub error_count: u32,
    pub max_errors: u32,
    pub cooling_down: bool,
    pub last_request_time: Option<DateTime<Utc>>,
    pub last_error_time: Option<DateTime<Utc>>,
    pub min_interval_secs: f64,
    pub max_interval_secs: f64,
    pub recovery_time_secs: u64,
    pub proxy_count: usize,
    pub user_agent_count: usize,
}

/// Throttles, rotates and circuit-breaks outbound calls.
///
/// Shared by every caller through an `Arc`; all counters are updated under a
/// single lock so concurrent governed calls never lose an update.
pub struct RequestGovernor {
    config: RwLock<GovernorConfig>,
    state: Mutex<GovernorState>,
}

impl RequestGovernor {
    pub fn new(config: GovernorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(config),
            state: Mutex::new(GovernorState::default()),
        })
    }

    pub fn config(&self) -> GovernorConfig {
        self.config.read().clone()
    }

    /// Whether the next call should be skipped because the circuit is open.
    ///
    /// Once the recovery window has elapsed since the last error the error
    /// count is reset and calls resume.
    pub fn should_skip(&self) -> bool {
        let config = self.config.read();
        if !config.enabled {
            return false;
        }

        let mut state = self.state.lock();
        if state.error_count < config.max_errors {
            return false;
        }
        let Some(last_error_at) = state.last_error_at else {
            return false;
        };

        let recovery = Duration::from_secs(config.recovery_time_secs);
        if last_error_at.elapsed() < recovery {
            return true;
        }

        state.error_count = 0;
        state.last_error_at = None;
        state.last_error_time = None;
        info!("Recovery window elapsed, resuming upstream requests");
        false
    }

    /// Delay to apply before the next permitted request.
    pub fn compute_delay(&self) -> Duration {
        let config = self.config.read();
        if !config.enabled {
            return Duration::ZERO;
        }
        let error_count = self.state.lock().error_count;
        scaled_delay(
            &config,
            error_count,
            rand::random::<f64>(),
            rand::random::<f64>(),
        )
    }

    /// Pick the identity for the next request and advance the proxy cursor.
    pub fn next_identity(&self) -> RequestIdentity {
        let config = self.config.read();
        let user_agent = if config.user_agents.is_empty() {
            None
        } else {
            let len = config.user_agents.len();
            let idx = ((rand::random::<f64>() * len as f64) as usize).min(len - 1);
            Some(config.user_agents[idx].clone())
        };

        let proxy = if config.proxy_list.is_empty() {
            None
        } else {
            let mut state = self.state.lock();
            let idx = state.proxy_cursor % config.proxy_list.len();
            state.proxy_cursor = (idx + 1) % config.proxy_list.len();
            Some(config.proxy_list[idx].clone())
        };

        RequestIdentity { user_agent, proxy }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.total_requests += 1;
        state.successful_requests += 1;
        state.last_request_time = Some(Utc::now());
        state.error_count = state.error_count.saturating_sub(1);
    }

    pub fn record_failure(&self, err: &crate::Error) {
        let max_errors = self.config.read().max_errors;
        let mut state = self.state.lock();
        let now = Utc::now();
        state.total_requests += 1;
        state.failed_requests += 1;
        state.last_request_time = Some(now);
        state.error_count += 1;
        state.last_error_at = Some(Instant::now());
        state.last_error_time = Some(now);

        if state.error_count >= max_errors {
            error!(
                error_count = state.error_count,
                max_errors,
                error = %err,
                "Too many consecutive upstream errors, pausing requests"
            );
        } else {
            warn!(error_count = state.error_count, error = %err, "Upstream request failed");
        }
    }

    /// Run `op` under the governor's policy.
    ///
    /// Returns [`Governed::Skipped`] without calling `op` while the circuit is
    /// open. Otherwise sleeps for the computed delay, hands `op` a fresh
    /// identity and records the outcome; errors are returned unchanged.
    pub async fn guarded_call<T, F, Fut>(&self, op: F) -> Result<Governed<T>>
    where
        F: FnOnce(RequestIdentity) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.should_skip() {
            debug!("Circuit open, skipping upstream request");
            return Ok(Governed::Skipped);
        }

        let delay = self.compute_delay();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "Delaying upstream request");
            tokio::time::sleep(delay).await;
        }

        let identity = self.next_identity();
        match op(identity).await {
            Ok(value) => {
                self.record_success();
                Ok(Governed::Completed(value))
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> GovernorStats {
        let config = self.config.read();
        let state = self.state.lock();
        let success_rate = if state.total_requests == 0 {
            0.0
        } else {
            let rate = state.successful_requests as f64 / state.total_requests as f64 * 100.0;
            (rate * 100.0).round() / 100.0
        };
        let cooling_down = config.enabled
            && state.error_count >= config.max_errors
            && state.last_error_at.is_some_and(|at| {
                at.elapsed() < Duration::from_secs(config.recovery_time_secs)
            });

        GovernorStats {
            enabled: config.enabled,
            total_requests: state.total_requests,
            successful_requests: state.successful_requests,
            failed_requests: state.failed_requests,
            success_rate,
            error_count: state.error_count,
            max_errors: config.max_errors,
            cooling_down,
            last_request_time: state.last_request_time,
            last_error_time: state.last_error_time,
            min_interval_secs: config.min_interval_secs,
            max_interval_secs: config.max_interval_secs,
            recovery_time_secs: config.recovery_time_secs,
            proxy_count: config.proxy_list.len(),
            user_agent_count: config.user_agents.len(),
        }
    }

    /// Replace the configuration. Counters and error state are kept.
    pub fn update_config(&self, config: GovernorConfig) -> Result<()> {
        config.validate()?;
        let proxies = config.proxy_list.len();
        *self.config.write() = config;
        let mut state = self.state.lock();
        if proxies == 0 || state.proxy_cursor >= proxies {
            state.proxy_cursor = 0;
        }
        info!(proxies, "Governor configuration updated");
        Ok(())
    }

    /// Operator reset of all counters and the circuit.
    pub fn reset_stats(&self) {
        *self.state.lock() = GovernorState::default();
        info!("Governor statistics reset");
    }
}
