use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use attendance_api::{
    app,
    config::{Config, StorageBackend},
    jobs::{register_engine_jobs, JobScheduler, PoolMetricsJob},
    middleware,
};
use domain::services::{AttendanceStore, InMemoryAttendanceStore};
use persistence::PgAttendanceStore;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    middleware::logging::init_logging(&config.logging)?;
    middleware::init_metrics()?;

    info!("Starting class attendance engine v{}", env!("CARGO_PKG_VERSION"));

    let mut scheduler = JobScheduler::new();

    let store: Arc<dyn AttendanceStore> = match config.storage.backend {
        StorageBackend::Postgres => {
            let db_config: persistence::db::DatabaseConfig = (&config.database).into();
            let pool = persistence::db::create_pool(&db_config)
                .await
                .context("Failed to connect to database")?;
            persistence::db::run_migrations(&pool).await?;
            scheduler.register(PoolMetricsJob::new(pool.clone()));
            Arc::new(PgAttendanceStore::new(pool))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; attendance data is lost on restart");
            Arc::new(InMemoryAttendanceStore::new())
        }
    };

    let notifier = app::build_notifier(&config.fcm);
    let engine = app::build_engine(&config, store, notifier)?;

    if config.scheduler.enabled {
        register_engine_jobs(&mut scheduler, &engine, &config.scheduler);
    } else {
        warn!("Background scheduler disabled; use the operations endpoints to drive the engine");
    }
    scheduler.start();

    let addr = config.socket_addr()?;
    let router = app::create_app(config, engine);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(30)).await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
