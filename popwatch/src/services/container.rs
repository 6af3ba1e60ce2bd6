//! Service container for dependency injection.
//!
//! Builds the component graph in dependency order: governor, catalog,
//! registry, repository, notifications, monitor, scheduler.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use crate::Result;
use crate::catalog::{CatalogSource, GovernedCatalog, HttpCatalogSource};
use crate::config::AppConfig;
use crate::database::models::{PriceHistoryDbModel, StockHistoryDbModel};
use crate::database::{DbPool, ProductRepository, SqlxProductRepository, WritePool};
use crate::domain::ProductState;
use crate::governor::{GovernorConfig, GovernorStats, RequestGovernor};
use crate::monitor::{ChangeEvent, ProductMonitor, TriggerOutcome, UpdateProgress};
use crate::notification::{NotificationService, NotificationServiceConfig};
use crate::registry::WatchRegistry;
use crate::scheduler::{Scheduler, SchedulerConfig, SchedulerStatus};

/// Largest page size accepted by [`ServiceContainer::list_products`].
const MAX_PAGE_SIZE: u32 = 200;

/// One page of stored products.
#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
    pub items: Vec<ProductState>,
    pub total: i64,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
}

/// Service container holding all application services.
pub struct ServiceContainer {
    pub governor: Arc<RequestGovernor>,
    pub registry: Arc<WatchRegistry>,
    pub repository: Arc<dyn ProductRepository>,
    pub notification_service: Arc<NotificationService>,
    pub monitor: Arc<ProductMonitor>,
    pub scheduler: Arc<Scheduler>,
    scheduler_config: SchedulerConfig,
}

impl ServiceContainer {
    /// Build the production graph: HTTP catalog and SQLite repository.
    pub fn new(config: &AppConfig, pool: DbPool, write_pool: WritePool) -> Result<Self> {
        let catalog: Arc<dyn CatalogSource> = Arc::new(HttpCatalogSource::new(config.catalog.clone())?);
        let repository: Arc<dyn ProductRepository> =
            Arc::new(SqlxProductRepository::new(pool, write_pool));
        let notification_service = Arc::new(NotificationService::new(config.notification.clone()));
        Self::with_components(config, catalog, repository, notification_service)
    }

    /// Build the graph around the given collaborators.
    pub fn with_components(
        config: &AppConfig,
        catalog: Arc<dyn CatalogSource>,
        repository: Arc<dyn ProductRepository>,
        notification_service: Arc<NotificationService>,
    ) -> Result<Self> {
        config.validate()?;
        info!("Initializing service container");

        let governor = Arc::new(RequestGovernor::new(config.governor.clone())?);
        let governed = GovernedCatalog::new(catalog, Arc::clone(&governor));
        let registry = Arc::new(WatchRegistry::new(governed.clone(), config.registry.clone())?);

        let monitor = Arc::new(ProductMonitor::new(
            governed,
            Arc::clone(&registry),
            Arc::clone(&repository),
            notification_service.clone(),
            config.monitor.clone(),
        )?);
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&monitor), &config.scheduler));

        info!(
            channels = ?notification_service.enabled_channels(),
            watched = registry.list().len(),
            "Service container initialized"
        );

        Ok(Self {
            governor,
            registry,
            repository,
            notification_service,
            monitor,
            scheduler,
            scheduler_config: config.scheduler.clone(),
        })
    }

    /// Start the scheduler when autostart is configured.
    pub fn initialize(&self) {
        if self.scheduler_config.autostart {
            self.start_scheduler(
                self.scheduler_config.interval(),
                self.scheduler_config.keywords.clone(),
            );
        }
    }

    /// Stop background work. An update already running is left to finish.
    pub async fn shutdown(&self) {
        if self.scheduler.stop().await {
            info!("Scheduler stopped during shutdown");
        }
    }

    // Update pipeline

    pub fn trigger_update(&self, keywords: Vec<String>) -> TriggerOutcome {
        self.monitor.trigger(keywords)
    }

    pub fn get_progress(&self) -> UpdateProgress {
        self.monitor.progress()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.monitor.subscribe()
    }

    // Watch list

    pub fn list_watched(&self) -> Vec<String> {
        self.registry.list()
    }

    pub async fn add_watched(&self, name: &str) -> Result<bool> {
        self.registry.add(name).await
    }

    pub fn remove_watched(&self, name: &str) -> bool {
        self.registry.remove(name)
    }

    // Governor

    pub fn governor_stats(&self) -> GovernorStats {
        self.governor.stats()
    }

    pub fn update_governor_config(&self, config: GovernorConfig) -> Result<()> {
        self.governor.update_config(config)
    }

    pub fn reset_governor_stats(&self) {
        self.governor.reset_stats();
    }

    // Scheduler

    pub fn start_scheduler(&self, interval: Duration, keywords: Vec<String>) -> bool {
        self.scheduler.start(interval, keywords)
    }

    pub async fn stop_scheduler(&self) -> bool {
        self.scheduler.stop().await
    }

    pub fn scheduler_status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }

    pub fn update_scheduler_settings(
        &self,
        interval: Option<Duration>,
        keywords: Option<Vec<String>>,
    ) -> Result<()> {
        self.scheduler.update_settings(interval, keywords)
    }

    // Notifications

    /// Current channel config with secrets masked.
    pub fn notification_config(&self) -> NotificationServiceConfig {
        self.notification_service.config_view()
    }

    pub fn update_notification_config(&self, config: NotificationServiceConfig) {
        self.notification_service.update_config(config);
    }

    pub async fn send_test_notification(&self) -> bool {
        self.notification_service.send_test().await
    }

    // Stored products

    /// Stored products, most recently checked first.
    pub async fn list_products(&self, page: u32, page_size: u32) -> Result<ProductPage> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = i64::from(page - 1) * i64::from(page_size);

        let items = self
            .repository
            .list_products(offset, i64::from(page_size))
            .await?;
        let total = self.repository.count_products().await?;

        Ok(ProductPage {
            items,
            total,
            page,
            page_size,
        })
    }

    pub async fn get_product(&self, id: &str) -> Result<ProductState> {
        self.repository
            .get_state(id)
            .await?
            .ok_or_else(|| crate::Error::not_found("product", id))
    }

    pub async fn price_history(&self, product_id: &str, limit: i64) -> Result<Vec<PriceHistoryDbModel>> {
        self.repository.price_history(product_id, limit).await
    }

    pub async fn stock_history(&self, product_id: &str, limit: i64) -> Result<Vec<StockHistoryDbModel>> {
        self.repository.stock_history(product_id, limit).await
    }
}
