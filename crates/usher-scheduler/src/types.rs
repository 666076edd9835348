//! Scheduler types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pending one-shot join job.
///
/// The meeting URL is both the business key and the scheduler key. This
/// assumes meeting URLs are globally unique and stable for the life of a
/// job, which holds for the calendar providers we ingest from.
#[derive(Debug, Clone)]
pub struct JoinJob {
    /// Meeting join URL; unique job identity.
    pub meeting_url: String,
    /// Display name the bot joins under.
    pub bot_name: String,
    /// When the join workflow should start.
    pub run_at: DateTime<Utc>,
    /// When the meeting is expected to end.
    pub meeting_end: DateTime<Utc>,
    /// When this job was registered.
    pub created_at: DateTime<Utc>,
}

impl JoinJob {
    pub fn new(
        meeting_url: impl Into<String>,
        bot_name: impl Into<String>,
        run_at: DateTime<Utc>,
        meeting_end: DateTime<Utc>,
    ) -> Self {
        Self {
            meeting_url: meeting_url.into(),
            bot_name: bot_name.into(),
            run_at,
            meeting_end,
            created_at: Utc::now(),
        }
    }

    /// A job is due once its trigger time has passed.
    ///
    /// A `run_at` in the past fires on the next tick; the contract puts no
    /// future-time constraint on registration.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.run_at <= now
    }
}

/// Whether a schedule call registered a new job or replaced a pending one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Created,
    Replaced,
}

/// One pending job as reported by the observability endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpcomingJob {
    /// Job identifier (the meeting URL).
    pub id: String,
    /// Trigger time.
    pub next_run_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn job_at(run_at: DateTime<Utc>) -> JoinJob {
        JoinJob::new(
            "https://meet.example/abc",
            "Bot-A",
            run_at,
            run_at + Duration::hours(1),
        )
    }

    #[test]
    fn test_future_job_not_due() {
        let now = Utc::now();
        assert!(!job_at(now + Duration::minutes(5)).is_due(now));
    }

    #[test]
    fn test_past_job_is_due() {
        let now = Utc::now();
        assert!(job_at(now - Duration::minutes(5)).is_due(now));
    }

    #[test]
    fn test_job_due_exactly_at_trigger_time() {
        let now = Utc::now();
        assert!(job_at(now).is_due(now));
    }
}
