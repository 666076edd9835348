//! Error types for the join workflow.

use thiserror::Error;
use usher_store::{JoinState, StoreError};

/// Errors from credential resolution.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No credential could be resolved for this bot.
    #[error("no credential found for bot: {0}")]
    NotFound(String),

    /// The credential service answered, but withheld the plaintext key.
    ///
    /// Happens when no internal secret is configured and the service only
    /// returns an opaque object id.
    #[error("credential service withheld the key for bot: {0}")]
    KeyWithheld(String),

    /// The credential service rejected the lookup.
    #[error("credential service rejected lookup for {bot_name}: status {status}")]
    Rejected { bot_name: String, status: u16 },

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed response from the credential service.
    #[error("invalid credential response: {0}")]
    InvalidResponse(String),
}

/// Errors from one join workflow invocation.
#[derive(Debug, Error)]
pub enum JoinError {
    /// Another attempt is already active (or already succeeded).
    #[error("join already active for meeting, state: {0}")]
    AlreadyActive(JoinState),

    /// Credential resolution failed; nothing was attempted remotely.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// The remote service refused to create the bot resource.
    #[error("bot creation rejected: status {status}: {body}")]
    CreateRejected { status: u16, body: String },

    /// Every creation attempt within the bound failed.
    #[error("bot creation failed after {attempts} attempts")]
    CreateExhausted { attempts: u32 },

    /// A status poll came back with a non-success HTTP status.
    #[error("bot status check failed: status {status}")]
    StatusCheckFailed { status: u16 },

    /// The remote service reported a fatal error while polling.
    #[error("remote service reported fatal_error for bot {bot_id}")]
    RemoteFatal { bot_id: String },

    /// The poll budget ran out before the bot reached a success state.
    #[error("poll budget exhausted after {polls} polls, last state: {last}")]
    PollBudgetExhausted { polls: u32, last: JoinState },

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed response from the joining service.
    #[error("invalid response from joining service: {0}")]
    InvalidResponse(String),

    /// Shared state store failure.
    #[error("state store error: {0}")]
    Store(#[from] StoreError),
}
