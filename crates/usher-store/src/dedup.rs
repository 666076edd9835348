//! Sweep dedup guard.
//!
//! A periodic calendar sweep re-submits every upcoming event it sees. This
//! guard keeps one sweep from scheduling the same meeting twice for the
//! same bot, and ignores meetings that are not close enough to starting.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::{StateStore, StoreError};

/// What the guard decided about a candidate meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepDecision {
    /// Newly claimed; the caller should schedule a join.
    Claimed,
    /// This (bot, meeting) pair was already claimed in the current sweep.
    AlreadyClaimed,
    /// The meeting starts further ahead than the lead window; skipped.
    OutsideWindow,
    /// The meeting's start time is already in the past; skipped.
    AlreadyStarted,
}

impl SweepDecision {
    /// Whether the caller should go on to schedule a join.
    pub fn should_schedule(&self) -> bool {
        matches!(self, SweepDecision::Claimed)
    }
}

/// Policy layer above the scheduling engine for calendar sweeps.
pub struct DedupGuard {
    store: Arc<dyn StateStore>,
    lead_window: Duration,
}

impl DedupGuard {
    /// Create a guard that claims meetings starting within `lead_window`.
    pub fn new(store: Arc<dyn StateStore>, lead_window: Duration) -> Self {
        Self { store, lead_window }
    }

    /// Decide whether `bot_name` should schedule a join for this meeting.
    ///
    /// `now` is passed in rather than read from the clock so one sweep
    /// evaluates every candidate against the same instant.
    pub async fn claim(
        &self,
        bot_name: &str,
        meeting_url: &str,
        meeting_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SweepDecision, StoreError> {
        if meeting_start < now {
            debug!(bot_name, meeting_url, "meeting already started, skipping");
            return Ok(SweepDecision::AlreadyStarted);
        }
        if meeting_start - now > self.lead_window {
            debug!(bot_name, meeting_url, "meeting outside lead window, skipping");
            return Ok(SweepDecision::OutsideWindow);
        }

        if self.store.claim_for_sweep(bot_name, meeting_url).await? {
            Ok(SweepDecision::Claimed)
        } else {
            Ok(SweepDecision::AlreadyClaimed)
        }
    }
}
