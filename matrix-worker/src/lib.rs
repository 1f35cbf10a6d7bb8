//! # Matrix Commerce Worker Library
//!
//! Periodic background jobs for the storefront.
//!
//! ## Modules
//!
//! - `config`: Worker settings from the environment
//! - `jobs`: The `Job` trait and the built-in jobs
//! - `scheduler`: Tick loop that runs due jobs until shutdown
//!
//! ## Example
//!
//! ```no_run
//! use matrix_worker::jobs::{DailySnapshotJob, NotificationCleanupJob};
//! use matrix_worker::scheduler::Scheduler;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example(pool: sqlx::PgPool) -> anyhow::Result<()> {
//! let scheduler = Scheduler::new(pool, Duration::from_secs(60))
//!     .with_job(Arc::new(DailySnapshotJob::default()))
//!     .with_job(Arc::new(NotificationCleanupJob::new(30)));
//!
//! scheduler.run().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod jobs;
pub mod scheduler;
