//! Scheduler service.
//!
//! A single background task runs the update pipeline, waits out the interval
//! and repeats. The wait is interruptible: `stop` cancels it immediately. An
//! update already in flight is left to finish on its own.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::monitor::{ProductMonitor, RunOutcome};
use crate::{Error, Result};

/// Default interval between update cycles (5 minutes).
const DEFAULT_INTERVAL_SECS: u64 = 300;

/// How long `stop` waits for the loop task to exit.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between the end of one cycle and the start of the next.
    pub interval_secs: u64,
    /// Search keywords passed to every run.
    pub keywords: Vec<String>,
    /// Start the loop when the service starts.
    pub autostart: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            keywords: Vec::new(),
            autostart: false,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(Error::validation("scheduler interval must be greater than zero"));
        }
        Ok(())
    }
}

/// Externally visible scheduler state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub interval_secs: u64,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone)]
struct Settings {
    interval: Duration,
    keywords: Vec<String>,
}

struct LoopHandle {
    token: CancellationToken,
    abort: AbortHandle,
    /// Taken by `stop`; the slot keeps the rest until the loop has exited.
    handle: Option<JoinHandle<()>>,
}

impl LoopHandle {
    fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.abort.is_finished()
    }
}

/// Drives [`ProductMonitor`] on a timer.
pub struct Scheduler {
    monitor: Arc<ProductMonitor>,
    settings: Arc<RwLock<Settings>>,
    task: Mutex<Option<LoopHandle>>,
}

impl Scheduler {
    pub fn new(monitor: Arc<ProductMonitor>, config: &SchedulerConfig) -> Self {
        Self {
            monitor,
            settings: Arc::new(RwLock::new(Settings {
                interval: config.interval(),
                keywords: config.keywords.clone(),
            })),
            task: Mutex::new(None),
        }
    }

    /// Start the loop with the given interval and keywords.
    ///
    /// Returns `false` if the loop is already running, still stopping, or the
    /// interval is zero. The first cycle starts immediately.
    pub fn start(&self, interval: Duration, keywords: Vec<String>) -> bool {
        if interval.is_zero() {
            warn!("Refusing to start scheduler with a zero interval");
            return false;
        }

        let mut task = self.task.lock();
        if let Some(current) = task.as_ref().filter(|t| !t.abort.is_finished()) {
            if current.token.is_cancelled() {
                info!("Scheduler is still stopping");
            } else {
                info!("Scheduler already running");
            }
            return false;
        }

        {
            let mut settings = self.settings.write();
            settings.interval = interval;
            settings.keywords = keywords;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.monitor),
            Arc::clone(&self.settings),
            token.clone(),
        ));
        *task = Some(LoopHandle {
            token,
            abort: handle.abort_handle(),
            handle: Some(handle),
        });

        info!(interval_secs = interval.as_secs(), "Scheduler started");
        true
    }

    /// Stop the loop. Returns `false` if it was not running.
    ///
    /// Future cycles are cancelled; a run already in progress keeps going.
    pub async fn stop(&self) -> bool {
        let (mut handle, abort) = {
            let mut task = self.task.lock();
            let Some(current) = task.as_mut().filter(|t| t.is_active()) else {
                return false;
            };
            current.token.cancel();
            let Some(handle) = current.handle.take() else {
                return false;
            };
            (handle, current.abort.clone())
        };

        match tokio::time::timeout(STOP_TIMEOUT, &mut handle).await {
            Ok(Ok(())) => info!("Scheduler stopped"),
            Ok(Err(e)) => error!(error = %e, "Scheduler task ended abnormally"),
            Err(_) => {
                warn!("Scheduler task did not stop in time, aborting");
                abort.abort();
            }
        }

        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| t.token.is_cancelled()) {
            *task = None;
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(LoopHandle::is_active)
    }

    pub fn status(&self) -> SchedulerStatus {
        let settings = self.settings.read().clone();
        SchedulerStatus {
            running: self.is_running(),
            interval_secs: settings.interval.as_secs(),
            keywords: settings.keywords,
        }
    }

    /// Change the interval and/or keywords. Takes effect from the next cycle.
    pub fn update_settings(&self, interval: Option<Duration>, keywords: Option<Vec<String>>) -> Result<()> {
        if interval.is_some_and(|i| i.is_zero()) {
            return Err(Error::validation("scheduler interval must be greater than zero"));
        }

        let mut settings = self.settings.write();
        if let Some(interval) = interval {
            settings.interval = interval;
        }
        if let Some(keywords) = keywords {
            settings.keywords = keywords;
        }
        debug!(
            interval_secs = settings.interval.as_secs(),
            keywords = settings.keywords.len(),
            "Scheduler settings updated"
        );
        Ok(())
    }
}

async fn run_loop(monitor: Arc<ProductMonitor>, settings: Arc<RwLock<Settings>>, token: CancellationToken) {
    loop {
        if token.is_cancelled() {
            break;
        }

        let keywords = settings.read().keywords.clone();
        match monitor.spawn_update(keywords) {
            Some(handle) => {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Scheduler cancelled while an update is in flight");
                        break;
                    }
                    result = handle => match result {
                        Ok(RunOutcome::Completed(summary)) => debug!(
                            run_id = %summary.run_id,
                            events = summary.events_emitted,
                            "Scheduled update finished"
                        ),
                        Ok(RunOutcome::Failed(reason)) => warn!(%reason, "Scheduled update failed"),
                        Ok(RunOutcome::Rejected) => {}
                        Err(e) => error!(error = %e, "Scheduled update task panicked"),
                    },
                }
            }
            None => debug!("Update still running, skipping this cycle"),
        }

        let interval = settings.read().interval;
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!("Scheduler loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::GovernedCatalog;
    use crate::catalog::testing::FakeCatalog;
    use crate::database::repositories::memory::InMemoryProductRepository;
    use crate::domain::ProductSnapshot;
    use crate::governor::{GovernorConfig, RequestGovernor};
    use crate::monitor::{ChangeEvent, MonitorConfig, UpdateStatus};
    use crate::notification::NotificationDispatcher;
    use crate::registry::{RegistryConfig, WatchRegistry};
    use async_trait::async_trait;

    struct NoopDispatcher;

    #[async_trait]
    impl NotificationDispatcher for NoopDispatcher {
        async fn dispatch(&self, _: &ChangeEvent) -> bool {
            false
        }
    }

    fn scheduler() -> (Arc<FakeCatalog>, Scheduler) {
        let catalog = Arc::new(FakeCatalog::new());
        catalog.add_new(ProductSnapshot::new("a", "LABUBU 太空旅行系列", 99.0));
        let governor = Arc::new(RequestGovernor::new(GovernorConfig::without_delays()).unwrap());
        let governed = GovernedCatalog::new(catalog.clone(), governor);
        let registry = Arc::new(WatchRegistry::new(governed.clone(), RegistryConfig::empty()).unwrap());
        let monitor = Arc::new(
            ProductMonitor::new(
                governed,
                registry,
                Arc::new(InMemoryProductRepository::new()),
                Arc::new(NoopDispatcher),
                MonitorConfig::default(),
            )
            .unwrap(),
        );
        (catalog, Scheduler::new(monitor, &SchedulerConfig::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_then_every_interval() {
        let (catalog, scheduler) = scheduler();
        assert!(scheduler.start(Duration::from_secs(60), Vec::new()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(catalog.call_count("list_new"), 1);
        assert_eq!(scheduler.monitor.progress().status, UpdateStatus::Completed);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(catalog.call_count("list_new"), 2);

        assert!(scheduler.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_rejected() {
        let (_, scheduler) = scheduler();
        assert!(scheduler.start(Duration::from_secs(60), Vec::new()));
        assert!(!scheduler.start(Duration::from_secs(60), Vec::new()));
        assert!(scheduler.is_running());
        assert!(scheduler.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_wait() {
        let (catalog, scheduler) = scheduler();
        assert!(scheduler.start(Duration::from_secs(3600), Vec::new()));
        tokio::time::sleep(Duration::from_secs(1)).await;

        let started = tokio::time::Instant::now();
        assert!(scheduler.stop().await);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!scheduler.is_running());
        assert!(!scheduler.stop().await);

        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(catalog.call_count("list_new"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_refused_until_stop_completes() {
        let (catalog, scheduler) = scheduler();
        assert!(scheduler.start(Duration::from_secs(3600), Vec::new()));
        tokio::time::sleep(Duration::from_secs(1)).await;

        let (stopped, restarted) = tokio::join!(scheduler.stop(), async {
            let restarted = scheduler.start(Duration::from_secs(3600), Vec::new());
            assert!(!scheduler.is_running());
            restarted
        });
        assert!(stopped);
        assert!(!restarted);
        assert!(scheduler.task.lock().is_none());

        assert!(scheduler.start(Duration::from_secs(3600), Vec::new()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(catalog.call_count("list_new"), 2);
        assert!(scheduler.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_apply_to_next_cycle() {
        let (catalog, scheduler) = scheduler();
        assert!(scheduler.start(Duration::from_secs(600), Vec::new()));
        tokio::time::sleep(Duration::from_secs(1)).await;

        scheduler
            .update_settings(None, Some(vec!["MOLLY".to_string()]))
            .unwrap();
        assert!(scheduler.update_settings(Some(Duration::ZERO), None).is_err());

        let status = scheduler.status();
        assert!(status.running);
        assert_eq!(status.interval_secs, 600);
        assert_eq!(status.keywords, vec!["MOLLY".to_string()]);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(catalog.call_count("search"), 1);
        assert!(scheduler.stop().await);
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let (_, scheduler) = scheduler();
        assert!(!scheduler.start(Duration::ZERO, Vec::new()));
        assert!(!scheduler.is_running());
    }
}
