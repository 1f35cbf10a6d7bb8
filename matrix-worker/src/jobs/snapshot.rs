/// Refreshes today's statistics snapshots
///
/// Writes one row per seller with sales today and one platform-wide row.
/// Yesterday is refreshed too during the first hour after midnight UTC so
/// late orders of the previous day are not lost.

use super::{Job, JobContext, JobResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Timelike, Utc};
use matrix_shared::models::statistics::StatisticsSnapshot;
use std::time::Duration;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct DailySnapshotJob {
    interval: Duration,
}

impl DailySnapshotJob {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for DailySnapshotJob {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

/// Days whose snapshots a run at `now` refreshes, oldest first
pub(crate) fn days_to_refresh(now: DateTime<Utc>) -> Vec<NaiveDate> {
    let today = now.date_naive();
    if now.hour() == 0 {
        vec![today - ChronoDuration::days(1), today]
    } else {
        vec![today]
    }
}

#[async_trait]
impl Job for DailySnapshotJob {
    fn name(&self) -> &'static str {
        "daily_snapshot"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self, ctx: &JobContext) -> JobResult<u64> {
        let mut written = 0;

        for day in days_to_refresh(Utc::now()) {
            let rows = StatisticsSnapshot::refresh_day(&ctx.db, day).await?;
            tracing::debug!(day = %day, rows, "Statistics snapshot refreshed");
            written += rows;
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_days_to_refresh_around_midnight() {
        let just_after = Utc.with_ymd_and_hms(2025, 3, 1, 0, 10, 0).unwrap();
        assert_eq!(
            days_to_refresh(just_after),
            vec![
                NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            ]
        );

        let afternoon = Utc.with_ymd_and_hms(2025, 3, 1, 15, 0, 0).unwrap();
        assert_eq!(
            days_to_refresh(afternoon),
            vec![NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()]
        );
    }
}
