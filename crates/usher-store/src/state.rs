//! Join lifecycle state as reported by the remote bot service.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of one meeting's join attempt.
///
/// The string forms match the remote service's wire values exactly, since
/// they are persisted verbatim into the shared store and read back by every
/// worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JoinState {
    /// A workflow has claimed the meeting but not yet created a bot.
    Requested,
    /// The bot resource exists and is connecting to the meeting.
    Joining,
    /// The bot is in the meeting.
    Joined,
    /// The bot is in the meeting and recording.
    JoinedRecording,
    /// The remote service reported an unrecoverable failure.
    FatalError,
    /// Any state the remote service reports that we do not interpret.
    Other(String),
}

impl JoinState {
    /// States that mean a bot exists and is in progress or has already
    /// succeeded.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JoinState::Joining | JoinState::Joined | JoinState::JoinedRecording
        )
    }

    /// States that block a new claim: the active set plus the `requested`
    /// claim marker itself.
    ///
    /// The marker must block, otherwise two workflows starting within one
    /// claim-to-persist window would both claim the meeting and both create
    /// a bot. A pre-creation abort clears the marker, so a stale claim
    /// cannot wedge the meeting.
    pub fn blocks_claim(&self) -> bool {
        *self == JoinState::Requested || self.is_active()
    }

    /// Terminal success states.
    pub fn is_success(&self) -> bool {
        matches!(self, JoinState::Joined | JoinState::JoinedRecording)
    }

    /// The wire string for this state.
    pub fn as_str(&self) -> &str {
        match self {
            JoinState::Requested => "requested",
            JoinState::Joining => "joining",
            JoinState::Joined => "joined",
            JoinState::JoinedRecording => "joined_recording",
            JoinState::FatalError => "fatal_error",
            JoinState::Other(s) => s,
        }
    }
}

impl From<String> for JoinState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "requested" => JoinState::Requested,
            "joining" => JoinState::Joining,
            "joined" => JoinState::Joined,
            "joined_recording" => JoinState::JoinedRecording,
            "fatal_error" => JoinState::FatalError,
            _ => JoinState::Other(s),
        }
    }
}

impl From<JoinState> for String {
    fn from(state: JoinState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for JoinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the atomic entry-guard claim on a meeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The meeting was free and is now claimed.
    Claimed,
    /// Another attempt is already active (or already succeeded) in this state.
    AlreadyActive(JoinState),
}
