/// Job scheduler
///
/// Wakes up every tick, runs every job whose interval has elapsed since its
/// last start, and waits for that batch before sleeping again. Jobs due on
/// the same tick run concurrently; each is bounded by its own timeout.
///
/// ```text
/// loop
///   ├─> collect due jobs
///   ├─> run them concurrently (timeout per job)
///   └─> sleep one tick, or stop on shutdown
/// ```
///
/// Shutdown is cooperative: cancelling the token stops the loop at the next
/// tick boundary; a batch already running is allowed to finish.

use crate::jobs::{Job, JobContext, JobError};
use futures::future::join_all;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Result of one job run
#[derive(Debug)]
pub struct JobOutcome {
    pub job: &'static str,
    pub result: Result<u64, JobError>,
    pub elapsed: Duration,
}

pub struct Scheduler {
    ctx: JobContext,
    tick: Duration,
    jobs: Vec<Arc<dyn Job>>,
    shutdown_token: CancellationToken,
}

/// True when a job that last started at `last` should run at `now`
pub fn is_due(last: Option<Instant>, now: Instant, interval: Duration) -> bool {
    match last {
        None => true,
        Some(started) => now.saturating_duration_since(started) >= interval,
    }
}

async fn run_one(job: Arc<dyn Job>, ctx: JobContext) -> JobOutcome {
    let started = Instant::now();
    let limit = job.timeout();

    let result = match tokio::time::timeout(limit, job.run(&ctx)).await {
        Ok(result) => result,
        Err(_) => Err(JobError::Timeout(limit)),
    };

    JobOutcome {
        job: job.name(),
        result,
        elapsed: started.elapsed(),
    }
}

impl Scheduler {
    pub fn new(db: PgPool, tick: Duration) -> Self {
        Self {
            ctx: JobContext::new(db),
            tick,
            jobs: Vec::new(),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn with_job(mut self, job: Arc<dyn Job>) -> Self {
        tracing::info!(job = job.name(), interval_secs = job.interval().as_secs(), "Registering job");
        self.jobs.push(job);
        self
    }

    pub fn jobs(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.jobs.iter().map(|job| job.name())
    }

    /// Token that stops [`Scheduler::run`] when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Runs the jobs due at `now` and records their start
    ///
    /// `last_started` holds one slot per registered job, in registration
    /// order.
    pub async fn run_due(&self, last_started: &mut [Option<Instant>], now: Instant) -> Vec<JobOutcome> {
        let mut batch = Vec::new();

        for (job, last) in self.jobs.iter().zip(last_started.iter_mut()) {
            if is_due(*last, now, job.interval()) {
                *last = Some(now);
                batch.push(run_one(job.clone(), self.ctx.clone()));
            }
        }

        join_all(batch).await
    }

    /// Runs until the shutdown token is cancelled
    pub async fn run(&self) {
        tracing::info!(jobs = self.jobs.len(), tick_secs = self.tick.as_secs(), "Scheduler starting");

        let mut last_started: Vec<Option<Instant>> = vec![None; self.jobs.len()];

        loop {
            if self.shutdown_token.is_cancelled() {
                break;
            }

            for outcome in self.run_due(&mut last_started, Instant::now()).await {
                match outcome.result {
                    Ok(rows) => tracing::info!(
                        job = outcome.job,
                        rows,
                        elapsed_ms = outcome.elapsed.as_millis() as u64,
                        "Job finished"
                    ),
                    Err(e) => tracing::error!(job = outcome.job, error = %e, "Job failed"),
                }
            }

            tokio::select! {
                _ = self.shutdown_token.cancelled() => break,
                _ = tokio::time::sleep(self.tick) => {}
            }
        }

        tracing::info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_due() {
        let start = Instant::now();
        let interval = Duration::from_secs(60);

        assert!(is_due(None, start, interval));
        assert!(!is_due(Some(start), start + Duration::from_secs(59), interval));
        assert!(is_due(Some(start), start + Duration::from_secs(60), interval));
    }
}
