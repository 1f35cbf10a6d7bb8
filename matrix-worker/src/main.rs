//! # Matrix Commerce Worker
//!
//! Runs the periodic jobs:
//!
//! - `daily_snapshot`: refreshes today's statistics snapshots
//! - `notification_cleanup`: deletes old read notifications
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p matrix-worker
//! ```

use matrix_shared::db::pool::create_pool;
use matrix_worker::{
    config::WorkerConfig,
    jobs::{DailySnapshotJob, NotificationCleanupJob},
    scheduler::Scheduler,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matrix_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Matrix Commerce Worker v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = WorkerConfig::from_env()?;
    let pool = create_pool(config.pool_config()).await?;

    let scheduler = Scheduler::new(pool.clone(), config.tick())
        .with_job(Arc::new(DailySnapshotJob::new(config.snapshot_interval())))
        .with_job(Arc::new(NotificationCleanupJob::new(config.retention_days)));

    let shutdown = scheduler.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
        shutdown.cancel();
    });

    scheduler.run().await;

    matrix_shared::db::pool::close_pool(pool).await;
    Ok(())
}
