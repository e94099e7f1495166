//! Background worker: runs the scheduled publication scanner and the
//! retention sweeper against Postgres until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use verso_db::PgVersionStore;
use verso_engine::config::EngineConfig;
use verso_engine::scheduler::{PublicationScheduler, RetentionSweeper};
use verso_engine::VersioningService;

/// How long each loop gets to finish its in-flight item after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "verso_worker=debug,verso_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = EngineConfig::from_env().context("Invalid configuration")?;
    tracing::info!(
        scheduler_interval_secs = config.scheduler_interval.as_secs(),
        retention_interval_secs = config.retention_interval.as_secs(),
        "Loaded worker configuration"
    );

    // --- Database ---
    let pool = verso_db::create_pool(&config.database_url, config.max_connections)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    verso_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    verso_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Versioning service ---
    let service = Arc::new(VersioningService::with_system_clock(Arc::new(
        PgVersionStore::new(pool),
    )));

    let cancel = CancellationToken::new();

    // Spawn scheduled publication scanner.
    let scheduler = PublicationScheduler::new(Arc::clone(&service), config.scheduler_interval);
    let scheduler_cancel = cancel.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_cancel).await;
    });

    // Spawn retention sweeper.
    let sweeper = RetentionSweeper::new(
        Arc::clone(&service),
        config.retention,
        config.retention_interval,
    );
    let sweeper_cancel = cancel.clone();
    let sweeper_handle = tokio::spawn(async move {
        sweeper.run(sweeper_cancel).await;
    });

    tracing::info!("Worker started (publication scheduler, retention sweeper)");

    shutdown_signal().await;

    // --- Shutdown ---
    tracing::info!("Shutdown signal received, stopping background loops");
    cancel.cancel();
    if tokio::time::timeout(SHUTDOWN_GRACE, scheduler_handle).await.is_err() {
        tracing::warn!("Publication scheduler did not stop in time");
    }
    if tokio::time::timeout(SHUTDOWN_GRACE, sweeper_handle).await.is_err() {
        tracing::warn!("Retention sweeper did not stop in time");
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
