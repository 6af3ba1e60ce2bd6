//! Application configuration.
//!
//! Every component has its own typed config with defaults. [`AppConfig`]
//! bundles them and applies overrides from environment variables.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Result;
use crate::catalog::CatalogConfig;
use crate::governor::GovernorConfig;
use crate::monitor::MonitorConfig;
use crate::notification::NotificationServiceConfig;
use crate::registry::RegistryConfig;
use crate::scheduler::SchedulerConfig;

const DEFAULT_DATABASE_URL: &str = "sqlite:popwatch.db?mode=rwc";
const DEFAULT_LOG_DIR: &str = "logs";

/// Complete configuration of the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    pub log_dir: String,
    pub catalog: CatalogConfig,
    pub governor: GovernorConfig,
    pub registry: RegistryConfig,
    pub monitor: MonitorConfig,
    pub scheduler: SchedulerConfig,
    pub notification: NotificationServiceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            log_dir: DEFAULT_LOG_DIR.to_string(),
            catalog: CatalogConfig::default(),
            governor: GovernorConfig::default(),
            registry: RegistryConfig::default(),
            monitor: MonitorConfig::default(),
            scheduler: SchedulerConfig::default(),
            notification: NotificationServiceConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `DATABASE_URL`, `LOG_DIR`
    /// - `POPWATCH_CATALOG_URL`, `POPWATCH_REGION`, `POPWATCH_REQUEST_TIMEOUT_SECS`
    /// - `POPWATCH_SCHEDULER_INTERVAL_SECS`, `POPWATCH_KEYWORDS`, `POPWATCH_AUTOSTART`
    /// - `POPWATCH_GOVERNOR_ENABLED`, `POPWATCH_MIN_INTERVAL_SECS`,
    ///   `POPWATCH_MAX_INTERVAL_SECS`, `POPWATCH_MAX_ERRORS`,
    ///   `POPWATCH_RECOVERY_TIME_SECS`, `POPWATCH_PROXIES`
    /// - `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`, `DISCORD_WEBHOOK_URL`
    ///
    /// Lists are comma separated. Unparseable values are ignored with a warning.
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env_or_default`](Self::from_env_or_default) with a
    /// custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = get("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(dir) = get("LOG_DIR") {
            config.log_dir = dir;
        }

        if let Some(url) = get("POPWATCH_CATALOG_URL") {
            config.catalog.base_url = url;
        }
        if let Some(region) = get("POPWATCH_REGION") {
            config.catalog.region = region;
        }
        if let Some(secs) = parse_var(&get, "POPWATCH_REQUEST_TIMEOUT_SECS") {
            config.catalog.request_timeout_secs = secs;
        }

        if let Some(secs) = parse_var(&get, "POPWATCH_SCHEDULER_INTERVAL_SECS") {
            config.scheduler.interval_secs = secs;
        }
        if let Some(keywords) = get("POPWATCH_KEYWORDS") {
            config.scheduler.keywords = split_list(&keywords);
        }
        if let Some(autostart) = parse_bool_var(&get, "POPWATCH_AUTOSTART") {
            config.scheduler.autostart = autostart;
        }

        if let Some(enabled) = parse_bool_var(&get, "POPWATCH_GOVERNOR_ENABLED") {
            config.governor.enabled = enabled;
        }
        if let Some(secs) = parse_var(&get, "POPWATCH_MIN_INTERVAL_SECS") {
            config.governor.min_interval_secs = secs;
        }
        if let Some(secs) = parse_var(&get, "POPWATCH_MAX_INTERVAL_SECS") {
            config.governor.max_interval_secs = secs;
        }
        if let Some(max_errors) = parse_var(&get, "POPWATCH_MAX_ERRORS") {
            config.governor.max_errors = max_errors;
        }
        if let Some(secs) = parse_var(&get, "POPWATCH_RECOVERY_TIME_SECS") {
            config.governor.recovery_time_secs = secs;
        }
        if let Some(proxies) = get("POPWATCH_PROXIES") {
            config.governor.proxy_list = split_list(&proxies);
        }

        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            config.notification.telegram.bot_token = token;
        }
        if let Some(chat_id) = get("TELEGRAM_CHAT_ID") {
            config.notification.telegram.chat_id = chat_id;
        }
        if let Some(webhook) = get("DISCORD_WEBHOOK_URL") {
            config.notification.discord.webhook_url = webhook;
        }

        config
    }

    /// Validate every component config.
    pub fn validate(&self) -> Result<()> {
        self.catalog.validate()?;
        self.governor.validate()?;
        self.registry.validate()?;
        self.monitor.validate()?;
        self.scheduler.validate()?;
        Ok(())
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable environment variable");
            None
        }
    }
}

fn parse_bool_var<G>(get: &G, key: &str) -> Option<bool>
where
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key)?;
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(key, value = %raw, "Ignoring unparseable boolean environment variable");
            None
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
