/// Deletes read notifications past the retention window

use super::{Job, JobContext, JobResult};
use async_trait::async_trait;
use matrix_shared::models::notification::Notification;
use std::time::Duration;

const INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct NotificationCleanupJob {
    retention_days: i64,
}

impl NotificationCleanupJob {
    pub fn new(retention_days: i64) -> Self {
        Self {
            retention_days: retention_days.max(1),
        }
    }

    pub fn retention_days(&self) -> i64 {
        self.retention_days
    }
}

#[async_trait]
impl Job for NotificationCleanupJob {
    fn name(&self) -> &'static str {
        "notification_cleanup"
    }

    fn interval(&self) -> Duration {
        INTERVAL
    }

    async fn run(&self, ctx: &JobContext) -> JobResult<u64> {
        let deleted = Notification::delete_read_older_than(&ctx.db, self.retention_days).await?;
        if deleted > 0 {
            tracing::info!(deleted, retention_days = self.retention_days, "Old notifications deleted");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_is_at_least_one_day() {
        assert_eq!(NotificationCleanupJob::new(0).retention_days(), 1);
        assert_eq!(NotificationCleanupJob::new(30).retention_days(), 30);
    }
}
