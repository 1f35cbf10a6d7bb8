/// Background jobs
///
/// A job is a named unit of periodic work. The scheduler calls
/// [`Job::run`] whenever [`Job::interval`] has elapsed since the job last
/// started. Jobs must be idempotent: a run may repeat after a crash or
/// overlap a slow previous run on another worker.
///
/// # Example
///
/// ```no_run
/// use async_trait::async_trait;
/// use matrix_worker::jobs::{Job, JobContext, JobResult};
/// use std::time::Duration;
///
/// struct Heartbeat;
///
/// #[async_trait]
/// impl Job for Heartbeat {
///     fn name(&self) -> &'static str {
///         "heartbeat"
///     }
///
///     fn interval(&self) -> Duration {
///         Duration::from_secs(30)
///     }
///
///     async fn run(&self, _ctx: &JobContext) -> JobResult<u64> {
///         tracing::info!("alive");
///         Ok(0)
///     }
/// }
/// ```

mod cleanup;
mod snapshot;

pub use cleanup::NotificationCleanupJob;
pub use snapshot::DailySnapshotJob;

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Job timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),
}

pub type JobResult<T> = Result<T, JobError>;

/// Resources shared by every job run
#[derive(Debug, Clone)]
pub struct JobContext {
    pub db: PgPool,
}

impl JobContext {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
pub trait Job: Send + Sync {
    /// Stable name used in logs
    fn name(&self) -> &'static str;

    /// Minimum time between two runs
    fn interval(&self) -> Duration;

    /// Upper bound for one run; the run is abandoned past it
    fn timeout(&self) -> Duration {
        Duration::from_secs(300)
    }

    /// Does the work and returns the number of rows it touched
    async fn run(&self, ctx: &JobContext) -> JobResult<u64>;
}
