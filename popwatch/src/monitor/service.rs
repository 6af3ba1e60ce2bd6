//! Product monitor: the update pipeline and its single-flight guard.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::detector::detect_changes;
use super::events::{ChangeEvent, ChangeEventBroadcaster};
use super::progress::{ProgressTracker, UpdateProgress, UpdateStatus};
use crate::catalog::GovernedCatalog;
use crate::database::ProductRepository;
use crate::database::models::{PriceHistoryDbModel, StockHistoryDbModel};
use crate::domain::{ProductSnapshot, ProductState};
use crate::notification::NotificationDispatcher;
use crate::registry::WatchRegistry;
use crate::{Error, Result};

const STAGE_LIMITED_PCT: f64 = 25.0;
const STAGE_WATCHED_PCT: f64 = 50.0;
const STAGE_KEYWORDS_PCT: f64 = 75.0;

/// Configuration for the product monitor.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Page size of the new-arrivals listing.
    pub new_arrivals_limit: usize,
    /// Page size of the limited-items listing.
    pub limited_limit: usize,
    /// Result limit of each keyword search.
    pub keyword_search_limit: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            new_arrivals_limit: 50,
            limited_limit: 50,
            keyword_search_limit: 20,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.new_arrivals_limit == 0 || self.limited_limit == 0 || self.keyword_search_limit == 0 {
            return Err(Error::validation("monitor limits must be greater than zero"));
        }
        Ok(())
    }
}

/// Counters of one update run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub products_checked: usize,
    pub items_failed: usize,
    pub events_emitted: usize,
    pub notifications_delivered: usize,
}

/// Result of asking for an update run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Another run was active; nothing happened.
    Rejected,
    Completed(RunSummary),
    Failed(String),
}

/// Answer to an on-demand trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerOutcome {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Holds the single-flight flag for the duration of a run.
///
/// Dropping the guard while the progress still says running (a panic or a
/// cancelled future) marks the run failed before releasing the flag.
struct FlightGuard<'a> {
    monitor: &'a ProductMonitor,
    run_id: Uuid,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.monitor.progress.snapshot().status == UpdateStatus::Running {
            warn!(run_id = %self.run_id, "Update run ended unexpectedly");
            self.monitor.progress.fail("Update interrupted");
        }
        self.monitor.running.store(false, Ordering::Release);
    }
}

/// The update pipeline.
pub struct ProductMonitor {
    catalog: GovernedCatalog,
    registry: Arc<WatchRegistry>,
    repository: Arc<dyn ProductRepository>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    broadcaster: ChangeEventBroadcaster,
    progress: ProgressTracker,
    running: AtomicBool,
    config: MonitorConfig,
}

impl ProductMonitor {
    pub fn new(
        catalog: GovernedCatalog,
        registry: Arc<WatchRegistry>,
        repository: Arc<dyn ProductRepository>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        config: MonitorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            catalog,
            registry,
            repository,
            dispatcher,
            broadcaster: ChangeEventBroadcaster::new(),
            progress: ProgressTracker::new(),
            running: AtomicBool::new(false),
            config,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn progress(&self) -> UpdateProgress {
        self.progress.snapshot()
    }

    /// Subscribe to change events as they are detected.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.broadcaster.subscribe()
    }

    /// Claim the single-flight flag and reset progress for a new run.
    fn try_claim(&self) -> Option<Uuid> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let run_id = Uuid::new_v4();
        self.progress.begin(run_id, "Starting update");
        Some(run_id)
    }

    /// Run one update cycle in the current task.
    ///
    /// Returns [`RunOutcome::Rejected`] without side effects when another run
    /// is active.
    pub async fn run_update(&self, keywords: &[String]) -> RunOutcome {
        let Some(run_id) = self.try_claim() else {
            info!("Update already running, ignoring request");
            return RunOutcome::Rejected;
        };
        let guard = FlightGuard {
            monitor: self,
            run_id,
        };
        self.execute(guard, keywords).await
    }

    /// Start an update cycle on a background task.
    ///
    /// The single-flight flag is claimed before this returns, so a second
    /// call made right after is rejected even if the task has not started.
    pub fn spawn_update(self: &Arc<Self>, keywords: Vec<String>) -> Option<JoinHandle<RunOutcome>> {
        let Some(run_id) = self.try_claim() else {
            info!("Update already running, ignoring request");
            return None;
        };

        let monitor = Arc::clone(self);
        Some(tokio::spawn(async move {
            let guard = FlightGuard {
                monitor: &monitor,
                run_id,
            };
            monitor.execute(guard, &keywords).await
        }))
    }

    /// On-demand trigger: accepted iff no run is active.
    pub fn trigger(self: &Arc<Self>, keywords: Vec<String>) -> TriggerOutcome {
        match self.spawn_update(keywords) {
            Some(_) => TriggerOutcome {
                accepted: true,
                reason: None,
            },
            None => TriggerOutcome {
                accepted: false,
                reason: Some("An update is already running".to_string()),
            },
        }
    }

    async fn execute(&self, guard: FlightGuard<'_>, keywords: &[String]) -> RunOutcome {
        let run_id = guard.run_id;
        let started = Instant::now();
        let mut summary = RunSummary {
            run_id,
            ..Default::default()
        };
        info!(%run_id, keywords = keywords.len(), "Update started");

        let outcome = match self.run_stages(keywords, &mut summary).await {
            Ok(()) => {
                self.progress.complete(format!(
                    "Update completed: {} products checked, {} changes",
                    summary.products_checked, summary.events_emitted
                ));
                info!(
                    %run_id,
                    products = summary.products_checked,
                    failed = summary.items_failed,
                    events = summary.events_emitted,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Update completed"
                );
                RunOutcome::Completed(summary)
            }
            Err(e) => {
                error!(%run_id, error = %e, "Update failed");
                self.progress.fail(format!("Update failed: {}", e));
                RunOutcome::Failed(e.to_string())
            }
        };

        drop(guard);
        outcome
    }

    async fn run_stages(&self, keywords: &[String], summary: &mut RunSummary) -> Result<()> {
        self.progress.advance(0.0, "Fetching new arrivals");
        let products = self
            .fetch_stage("new_arrivals", self.catalog.list_new(self.config.new_arrivals_limit))
            .await?;
        self.process_batch(&products, summary).await;

        self.progress.advance(STAGE_LIMITED_PCT, "Fetching limited items");
        let products = self
            .fetch_stage("limited", self.catalog.list_limited(self.config.limited_limit))
            .await?;
        self.process_batch(&products, summary).await;

        self.progress.advance(STAGE_WATCHED_PCT, "Fetching watched items");
        let products = self
            .fetch_stage("watched", self.registry.fetch_watched())
            .await?;
        self.process_batch(&products, summary).await;

        self.progress.advance(STAGE_KEYWORDS_PCT, "Searching keywords");
        let total = keywords.len();
        for (i, keyword) in keywords.iter().enumerate() {
            let products = self
                .fetch_stage(
                    "keyword",
                    self.catalog.search(keyword, self.config.keyword_search_limit),
                )
                .await?;
            self.process_batch(&products, summary).await;

            let pct = STAGE_KEYWORDS_PCT + (i + 1) as f64 / total as f64 * (100.0 - STAGE_KEYWORDS_PCT);
            self.progress
                .advance(pct, format!("Searched keyword '{}' ({}/{})", keyword, i + 1, total));
        }

        Ok(())
    }

    /// Await a source fetch; transient upstream errors yield an empty source.
    async fn fetch_stage<F>(&self, stage: &str, fetch: F) -> Result<Vec<ProductSnapshot>>
    where
        F: Future<Output = Result<Vec<ProductSnapshot>>>,
    {
        match fetch.await {
            Ok(products) => {
                debug!(stage, count = products.len(), "Fetched products");
                Ok(products)
            }
            Err(e) if e.is_transient() => {
                warn!(stage, error = %e, "Source unavailable, skipping");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn process_batch(&self, products: &[ProductSnapshot], summary: &mut RunSummary) {
        for product in products {
            summary.products_checked += 1;
            if let Err(e) = self.process_product(product, summary).await {
                summary.items_failed += 1;
                warn!(id = %product.id, name = %product.name, error = %e, "Failed to process product");
            }
        }
    }

    async fn process_product(&self, snapshot: &ProductSnapshot, summary: &mut RunSummary) -> Result<()> {
        let now = Utc::now();
        let previous = self.repository.get_state(&snapshot.id).await?;
        let detection = detect_changes(previous.as_ref().map(|s| &s.snapshot), snapshot, now);

        let (state, price_row, stock_row) = match &previous {
            Some(prev) => (
                prev.advance(snapshot.clone(), now),
                detection
                    .price_changed
                    .then(|| PriceHistoryDbModel::between(&prev.snapshot, snapshot, now)),
                detection
                    .stock_changed
                    .then(|| StockHistoryDbModel::between(&prev.snapshot, snapshot, now)),
            ),
            None => (ProductState::first_seen(snapshot.clone(), now), None, None),
        };

        self.repository
            .record_observation(&state, price_row.as_ref(), stock_row.as_ref())
            .await?;

        for event in detection.events {
            debug!(id = %snapshot.id, kind = event.event_type(), "Change detected");
            summary.events_emitted += 1;
            self.broadcaster.publish(event.clone());
            if self.dispatcher.dispatch(&event).await {
                summary.notifications_delivered += 1;
            } else {
                debug!(id = %snapshot.id, kind = event.event_type(), "Change notification not delivered");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::FakeCatalog;
    use crate::database::repositories::memory::InMemoryProductRepository;
    use crate::governor::{GovernorConfig, RequestGovernor};
    use crate::monitor::ChangeKind;
    use crate::registry::RegistryConfig;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingDispatcher {
        events: Mutex<Vec<ChangeEvent>>,
        deliver: bool,
    }

    #[async_trait]
    impl NotificationDispatcher for RecordingDispatcher {
        async fn dispatch(&self, event: &ChangeEvent) -> bool {
            self.events.lock().push(event.clone());
            self.deliver
        }
    }

    impl RecordingDispatcher {
        fn kinds(&self) -> Vec<&'static str> {
            self.events.lock().iter().map(|e| e.event_type()).collect()
        }
    }

    struct Harness {
        catalog: Arc<FakeCatalog>,
        repository: Arc<InMemoryProductRepository>,
        dispatcher: Arc<RecordingDispatcher>,
        monitor: Arc<ProductMonitor>,
    }

    fn harness(watch_list: &[&str]) -> Harness {
        let catalog = Arc::new(FakeCatalog::new());
        let repository = Arc::new(InMemoryProductRepository::new());
        let dispatcher = Arc::new(RecordingDispatcher {
            deliver: true,
            ..Default::default()
        });
        let governor = Arc::new(RequestGovernor::new(GovernorConfig::without_delays()).unwrap());
        let governed = GovernedCatalog::new(catalog.clone(), governor);
        let registry = Arc::new(
            WatchRegistry::new(
                governed.clone(),
                RegistryConfig {
                    watch_list: watch_list.iter().map(|s| s.to_string()).collect(),
                    resolution_brands: Vec::new(),
                    ..RegistryConfig::default()
                },
            )
            .unwrap(),
        );
        let monitor = Arc::new(
            ProductMonitor::new(
                governed,
                registry,
                repository.clone(),
                dispatcher.clone(),
                MonitorConfig::default(),
            )
            .unwrap(),
        );
        Harness {
            catalog,
            repository,
            dispatcher,
            monitor,
        }
    }

    fn completed(outcome: RunOutcome) -> RunSummary {
        match outcome {
            RunOutcome::Completed(summary) => summary,
            other => panic!("expected completed run, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_first_run_stores_state_without_diff_events() {
        let h = harness(&[]);
        h.catalog.add_new(ProductSnapshot::new("a", "MOLLY 幻想大亨系列", 89.0).with_stock(true, 3));
        h.catalog.add_new(ProductSnapshot::new("b", "DIMOO 迷失在太空系列", 99.0).with_flags(true, false));
        h.catalog.add_limited(ProductSnapshot::new("c", "LABUBU 太空旅行系列", 129.0).with_flags(false, true));

        let summary = completed(h.monitor.run_update(&[]).await);

        assert_eq!(summary.products_checked, 3);
        assert_eq!(h.repository.state_count(), 3);
        assert_eq!(h.dispatcher.kinds(), vec!["new_arrival", "limited_release"]);
        assert!(h.repository.price_rows().is_empty());
        assert!(h.repository.stock_rows().is_empty());

        let progress = h.monitor.progress();
        assert_eq!(progress.status, UpdateStatus::Completed);
        assert_eq!(progress.percentage, 100.0);
    }

    #[tokio::test]
    async fn test_price_drop_and_restock_detected_on_next_run() {
        let h = harness(&[]);
        h.catalog.set_new(vec![ProductSnapshot::new("a", "SKULLPANDA 溫度系列", 350.0).with_stock(false, 0)]);
        completed(h.monitor.run_update(&[]).await);

        h.catalog.set_new(vec![ProductSnapshot::new("a", "SKULLPANDA 溫度系列", 299.0).with_stock(true, 8)]);
        let summary = completed(h.monitor.run_update(&[]).await);

        assert_eq!(summary.events_emitted, 2);
        let events = h.dispatcher.events.lock().clone();
        assert_eq!(
            events[0].kind,
            ChangeKind::PriceChanged {
                old_price: 350.0,
                new_price: 299.0
            }
        );
        assert_eq!(events[0].change_percentage(), Some(-14.57));
        assert_eq!(events[1].event_type(), "restocked");

        let price_rows = h.repository.price_rows();
        assert_eq!(price_rows.len(), 1);
        assert_eq!((price_rows[0].old_price, price_rows[0].new_price), (350.0, 299.0));
        let stock_rows = h.repository.stock_rows();
        assert_eq!(stock_rows.len(), 1);
        assert!(!stock_rows[0].old_in_stock && stock_rows[0].new_in_stock);
    }

    #[tokio::test]
    async fn test_unresolvable_watch_entry_completes() {
        let h = harness(&["NONEXISTENT 系列"]);
        let summary = completed(h.monitor.run_update(&[]).await);
        assert_eq!(summary.products_checked, 0);

        let progress = h.monitor.progress();
        assert_eq!(progress.status, UpdateStatus::Completed);
        assert_eq!(progress.percentage, 100.0);
        assert!(!h.monitor.is_running());
    }

    #[tokio::test]
    async fn test_trigger_is_single_flight() {
        let h = harness(&[]);
        h.catalog.add_new(ProductSnapshot::new("a", "PUCKY 森林精靈系列", 79.0));

        let handle = h.monitor.spawn_update(Vec::new()).expect("first run accepted");
        let second = h.monitor.trigger(Vec::new());
        assert!(!second.accepted);
        assert!(second.reason.is_some());
        assert_eq!(h.monitor.run_update(&[]).await, RunOutcome::Rejected);

        completed(handle.await.unwrap());
        assert!(!h.monitor.is_running());
        assert!(h.monitor.trigger(Vec::new()).accepted);
    }

    #[tokio::test]
    async fn test_item_failure_is_skipped() {
        let h = harness(&[]);
        h.catalog.add_new(ProductSnapshot::new("bad", "broken", 1.0));
        h.catalog.add_new(ProductSnapshot::new("good", "HIRONO 夢幻星球系列", 89.0));
        h.repository.fail_writes_for("bad");

        let summary = completed(h.monitor.run_update(&[]).await);
        assert_eq!(summary.items_failed, 1);
        assert_eq!(h.repository.state_count(), 1);
    }

    #[tokio::test]
    async fn test_upstream_outage_completes_with_empty_sources() {
        let h = harness(&["MOLLY 幻想大亨系列"]);
        h.catalog.set_failing(true);

        let summary = completed(h.monitor.run_update(&["LABUBU".to_string()]).await);
        assert_eq!(summary.products_checked, 0);
        assert_eq!(h.monitor.progress().percentage, 100.0);
    }

    #[tokio::test]
    async fn test_malformed_watched_item_does_not_fail_run() {
        let h = harness(&["SKULLPANDA 溫度系列", "MOLLY 幻想大亨系列"]);
        for product in [
            ProductSnapshot::new("w1", "SKULLPANDA 溫度系列", 79.0),
            ProductSnapshot::new("w2", "MOLLY 幻想大亨系列", 89.0),
        ] {
            h.catalog.add_popular(product.clone());
            h.catalog.add_catalog(product);
        }
        h.catalog.add_catalog(ProductSnapshot::new("k1", "LABUBU 心心相印", 99.0));
        h.catalog.set_malformed("w1");

        let summary = completed(h.monitor.run_update(&["LABUBU".to_string()]).await);

        assert_eq!(summary.products_checked, 2);
        assert_eq!(h.catalog.call_count("search"), 1);
        assert_eq!(h.repository.state_count(), 2);
        let progress = h.monitor.progress();
        assert_eq!(progress.status, UpdateStatus::Completed);
        assert_eq!(progress.percentage, 100.0);
    }

    #[tokio::test]
    async fn test_keyword_searches_are_processed() {
        let h = harness(&[]);
        h.catalog.add_catalog(ProductSnapshot::new("k1", "LABUBU 心心相印", 99.0).with_flags(true, false));
        h.catalog.add_catalog(ProductSnapshot::new("k2", "MOLLY 海洋系列", 89.0));

        let keywords = vec!["LABUBU".to_string(), "MOLLY".to_string()];
        let summary = completed(h.monitor.run_update(&keywords).await);

        assert_eq!(summary.products_checked, 2);
        assert_eq!(h.catalog.call_count("search"), 2);
        assert_eq!(h.dispatcher.kinds(), vec!["new_arrival"]);
    }

    #[tokio::test]
    async fn test_change_events_are_broadcast() {
        let h = harness(&[]);
        let mut rx = h.monitor.subscribe();
        h.catalog.add_new(ProductSnapshot::new("n", "DIMOO", 59.0).with_flags(true, false));

        completed(h.monitor.run_update(&[]).await);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.product.id, "n");
    }
}
