//! Scheduling engine implementation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{RwLock, watch};
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::{JoinJob, ScheduleOutcome, UpcomingJob};

/// Minimum sleep duration between scheduler checks.
const MIN_SLEEP_SECS: u64 = 1;

/// Maximum sleep duration between scheduler checks.
const MAX_SLEEP_SECS: u64 = 60;

/// Type alias for the job executor function.
///
/// The returned future is handed to `tokio::spawn`; its error is logged,
/// never retried. The dedup guard and the shared join state are the safety
/// nets against a dropped attempt.
pub type JobExecutor =
    Box<dyn Fn(JoinJob) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> + Send + Sync>;

/// In-memory one-shot job scheduler, keyed by meeting URL.
pub struct Scheduler {
    jobs: Arc<RwLock<Vec<JoinJob>>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a job, replacing any pending job for the same meeting URL.
    ///
    /// At most one live job exists per meeting URL; re-registering moves
    /// the trigger time rather than creating a second job.
    #[tracing::instrument(skip(self, job), fields(meeting_url = %job.meeting_url, run_at = %job.run_at))]
    pub async fn schedule(&self, job: JoinJob) -> ScheduleOutcome {
        let mut jobs = self.jobs.write().await;
        if let Some(existing) = jobs.iter_mut().find(|j| j.meeting_url == job.meeting_url) {
            *existing = job;
            info!("replaced pending job");
            ScheduleOutcome::Replaced
        } else {
            jobs.push(job);
            info!("scheduled job");
            ScheduleOutcome::Created
        }
    }

    /// Get a pending job by meeting URL.
    pub async fn get(&self, meeting_url: &str) -> Option<JoinJob> {
        self.jobs
            .read()
            .await
            .iter()
            .find(|j| j.meeting_url == meeting_url)
            .cloned()
    }

    /// Whether a job is pending for this meeting URL.
    pub async fn is_scheduled(&self, meeting_url: &str) -> bool {
        self.get(meeting_url).await.is_some()
    }

    /// Pending job identifiers, ordered by trigger time then URL.
    pub async fn list_ids(&self) -> Vec<String> {
        self.upcoming()
            .await
            .into_iter()
            .map(|j| j.id)
            .collect()
    }

    /// Pending jobs with their trigger times, ordered by trigger time then
    /// URL.
    pub async fn upcoming(&self) -> Vec<UpcomingJob> {
        let jobs = self.jobs.read().await;
        let mut upcoming: Vec<UpcomingJob> = jobs
            .iter()
            .map(|j| UpcomingJob {
                id: j.meeting_url.clone(),
                next_run_time: j.run_at,
            })
            .collect();
        upcoming.sort_by(|a, b| a.next_run_time.cmp(&b.next_run_time).then(a.id.cmp(&b.id)));
        upcoming
    }

    /// Number of pending jobs.
    pub async fn pending_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Cancel every pending job. Jobs already triggered keep running.
    pub async fn cancel_all(&self) -> usize {
        let mut jobs = self.jobs.write().await;
        let cancelled = jobs.len();
        jobs.clear();
        info!(cancelled, "cancelled all pending jobs");
        cancelled
    }

    /// Remove and return every due job.
    ///
    /// Removal before execution is what makes a job fire exactly once: a
    /// crash between removal and spawn drops the attempt, which the shared
    /// join state and the dedup guard are the documented safety nets for.
    pub async fn take_due_jobs(&self) -> Vec<JoinJob> {
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;
        let (due, pending): (Vec<JoinJob>, Vec<JoinJob>) =
            jobs.drain(..).partition(|j| j.is_due(now));
        *jobs = pending;
        due
    }

    /// How long to sleep until the next job is due, bounded to
    /// [`MIN_SLEEP_SECS`, `MAX_SLEEP_SECS`].
    pub async fn sleep_duration(&self) -> std::time::Duration {
        let jobs = self.jobs.read().await;
        let now = Utc::now();

        let next_due = jobs.iter().map(|j| j.run_at).min();
        let secs = match next_due {
            Some(next) => {
                let diff = (next - now).num_seconds();
                (diff.max(MIN_SLEEP_SECS as i64) as u64).min(MAX_SLEEP_SECS)
            }
            None => MAX_SLEEP_SECS,
        };

        std::time::Duration::from_secs(secs)
    }

    /// Run the scheduler loop until the shutdown signal flips.
    ///
    /// Due jobs are spawned as independent tasks and the loop moves on
    /// immediately; the timer thread never blocks on a workflow's network
    /// I/O.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>, executor: JobExecutor) {
        info!("scheduler starting");

        loop {
            if *shutdown_rx.borrow() {
                info!("scheduler shutting down");
                break;
            }

            for job in self.take_due_jobs().await {
                info!(meeting_url = %job.meeting_url, bot_name = %job.bot_name, "job due, spawning workflow");
                let meeting_url = job.meeting_url.clone();
                let fut = executor(job);
                tokio::spawn(async move {
                    if let Err(error) = fut.await {
                        error!(meeting_url = %meeting_url, error, "join workflow failed");
                    }
                });
            }

            let sleep_duration = self.sleep_duration().await;
            debug!(secs = sleep_duration.as_secs(), "sleeping until next check");

            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("scheduler received shutdown signal");
                    }
                }
                _ = sleep(sleep_duration) => {}
            }
        }

        info!("scheduler shut down gracefully");
    }
}
