//! Shared state store access layer for Usher.
//!
//! This crate provides the cross-process state that lets multiple worker
//! processes agree on what has already been attempted:
//! - Per-meeting join state (the workflow's entry guard and progress record)
//! - Per-bot dedup set for calendar sweeps
//! - A shared credential cache tier
//!
//! Two implementations exist: [`RedisStore`] for multi-process deployments
//! and [`MemoryStore`] for tests and single-process runs. Both guarantee
//! that the claim operations are atomic single-key transforms.

mod dedup;
mod error;
mod redis_store;
mod state;
mod store;

pub use dedup::{DedupGuard, SweepDecision};
pub use error::StoreError;
pub use redis_store::RedisStore;
pub use state::{ClaimOutcome, JoinState};
pub use store::{MemoryStore, StateStore};

/// Store key holding the meeting URL → join state JSON object.
pub const MEETING_STATES_KEY: &str = "meeting_states";

/// Store key holding the bot name → claimed meeting URLs JSON object.
pub const SWEEP_CLAIMS_KEY: &str = "bot_added_in_meeting";

/// Store key (hash) holding the bot name → API key credential cache.
pub const BOT_API_KEYS_KEY: &str = "bot_api_keys";
