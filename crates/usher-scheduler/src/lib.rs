//! One-shot job scheduler for Usher.
//!
//! This crate decouples "when to start" from "how long the work takes":
//! - Jobs are keyed by meeting URL; scheduling the same URL again replaces
//!   the pending job instead of duplicating it
//! - The timer loop hands every due job to `tokio::spawn`, so a
//!   multi-minute join workflow never delays other due jobs
//! - A job fires exactly once and is removed when it fires

mod scheduler;
mod types;

pub use scheduler::{JobExecutor, Scheduler};
pub use types::{JoinJob, ScheduleOutcome, UpcomingJob};
