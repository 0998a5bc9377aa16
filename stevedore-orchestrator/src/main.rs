use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod backend;
pub mod catalog;
pub mod config;
pub mod datastore;
pub mod db;
pub mod executor;
pub mod pipeline;
pub mod repository;
pub mod scheduler;
pub mod service;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stevedore_orchestrator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Stevedore Orchestrator...");

    let config = config::Config::from_env();
    config.validate()?;

    let catalog = Arc::new(catalog::Catalog::load(
        &config.apps_path,
        &config.systems_path,
    )?);

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    tracing::info!("Database ready");

    let executor: Arc<dyn executor::CommandExecutor> =
        Arc::new(executor::ProcessCommandExecutor::new());
    let data_store: Arc<dyn datastore::DataStore> = Arc::new(datastore::FilesServiceClient::new(
        config.files_url.clone(),
        config.store_id.clone(),
        config.admin_user.clone(),
    ));

    let manager = Arc::new(service::JobManager::new(
        pool,
        catalog,
        executor,
        data_store,
        config.clone(),
    ));

    if !config.scheduler {
        // Non-scheduler instances serve lookups through the external API
        // layer and never drive jobs.
        tracing::info!("Scheduler disabled on this instance, exiting");
        return Ok(());
    }

    let stopped = manager.recover().await?;
    tracing::info!("Recovery complete ({} job(s) stopped)", stopped);

    let scheduler = scheduler::Scheduler::new(
        Arc::clone(&manager),
        config.initial_delay,
        config.update_interval,
        config.max_running_jobs,
    );
    scheduler.run().await;

    Ok(())
}
