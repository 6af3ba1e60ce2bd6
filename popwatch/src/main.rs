use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use popwatch::config::AppConfig;
use popwatch::database;
use popwatch::logging;
use popwatch::services::ServiceContainer;
use popwatch::utils::http_client::install_rustls_provider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env_or_default();
    let (logging_config, _guard) = logging::init_logging(&config.log_dir)?;
    config.validate().context("invalid configuration")?;

    let shutdown = CancellationToken::new();
    logging_config.start_retention_cleanup(shutdown.child_token());

    install_rustls_provider();

    // Initialize database
    let pool = database::init_pool(&config.database_url).await?;
    let write_pool = database::init_write_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;

    let container = ServiceContainer::new(&config, pool, write_pool)?;
    container.initialize();

    info!(
        scheduler_running = container.scheduler_status().running,
        "popwatch started"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }

    info!("Shutting down");
    shutdown.cancel();
    container.shutdown().await;

    Ok(())
}
