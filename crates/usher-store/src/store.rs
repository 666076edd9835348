//! The store seam and the in-process implementation.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashSet;

use crate::{ClaimOutcome, JoinState, StoreError};

/// Narrow access to the shared, crash-surviving state store.
///
/// All keys are logically independent maps; an update to one never locks
/// another. The claim operations are atomic single-key transforms, which is
/// what closes the read-then-write race between independent worker
/// processes.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Last observed join state for a meeting, if any.
    async fn meeting_state(&self, meeting_url: &str) -> Result<Option<JoinState>, StoreError>;

    /// Persist the latest observed join state for a meeting.
    async fn set_meeting_state(
        &self,
        meeting_url: &str,
        state: JoinState,
    ) -> Result<(), StoreError>;

    /// Remove a meeting's join state entirely.
    ///
    /// Used to roll back an entry-guard claim when a workflow aborts before
    /// it has done any remote work, so the meeting stays claimable.
    async fn clear_meeting_state(&self, meeting_url: &str) -> Result<(), StoreError>;

    /// Atomically claim a meeting for a new join attempt.
    ///
    /// If the stored state blocks a claim (`requested`, `joining`,
    /// `joined`, `joined_recording`), returns it without writing. Otherwise
    /// sets `initial` and reports [`ClaimOutcome::Claimed`].
    async fn claim_meeting(
        &self,
        meeting_url: &str,
        initial: JoinState,
    ) -> Result<ClaimOutcome, StoreError>;

    /// Atomically add a meeting to a bot's per-sweep claimed set.
    ///
    /// Returns `true` when the meeting was newly added, `false` when it was
    /// already present.
    async fn claim_for_sweep(&self, bot_name: &str, meeting_url: &str)
    -> Result<bool, StoreError>;

    /// Shared-tier credential cache lookup.
    async fn cached_credential(&self, bot_name: &str) -> Result<Option<String>, StoreError>;

    /// Write a resolved credential to the shared tier.
    async fn cache_credential(&self, bot_name: &str, api_key: &str) -> Result<(), StoreError>;

    /// Cold-start reset: clear meeting states and sweep claims.
    ///
    /// Run explicitly at process startup. Does not touch the credential
    /// cache, which outlives restarts.
    async fn reset(&self) -> Result<(), StoreError>;
}

/// In-process store for tests and single-process deployments.
///
/// Per-key atomicity comes from the dashmap entry API: each claim holds the
/// shard lock for the whole check-then-write.
#[derive(Debug, Default)]
pub struct MemoryStore {
    meetings: DashMap<String, JoinState>,
    sweeps: DashMap<String, HashSet<String>>,
    credentials: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn meeting_state(&self, meeting_url: &str) -> Result<Option<JoinState>, StoreError> {
        Ok(self.meetings.get(meeting_url).map(|s| s.clone()))
    }

    async fn set_meeting_state(
        &self,
        meeting_url: &str,
        state: JoinState,
    ) -> Result<(), StoreError> {
        self.meetings.insert(meeting_url.to_string(), state);
        Ok(())
    }

    async fn clear_meeting_state(&self, meeting_url: &str) -> Result<(), StoreError> {
        self.meetings.remove(meeting_url);
        Ok(())
    }

    async fn claim_meeting(
        &self,
        meeting_url: &str,
        initial: JoinState,
    ) -> Result<ClaimOutcome, StoreError> {
        match self.meetings.entry(meeting_url.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().blocks_claim() {
                    Ok(ClaimOutcome::AlreadyActive(entry.get().clone()))
                } else {
                    entry.insert(initial);
                    Ok(ClaimOutcome::Claimed)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(initial);
                Ok(ClaimOutcome::Claimed)
            }
        }
    }

    async fn claim_for_sweep(
        &self,
        bot_name: &str,
        meeting_url: &str,
    ) -> Result<bool, StoreError> {
        let mut claimed = self.sweeps.entry(bot_name.to_string()).or_default();
        Ok(claimed.insert(meeting_url.to_string()))
    }

    async fn cached_credential(&self, bot_name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.credentials.get(bot_name).map(|k| k.clone()))
    }

    async fn cache_credential(&self, bot_name: &str, api_key: &str) -> Result<(), StoreError> {
        self.credentials
            .insert(bot_name.to_string(), api_key.to_string());
        Ok(())
    }

    async fn reset(&self) -> Result<(), StoreError> {
        self.meetings.clear();
        self.sweeps.clear();
        Ok(())
    }
}
