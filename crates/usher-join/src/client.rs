//! Client for the remote bot-joining service.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use usher_store::JoinState;

use crate::JoinError;

/// A bot resource the remote service created for a meeting.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedBot {
    /// Remote resource id, used for status polls.
    pub id: String,
    /// Initial state reported at creation time.
    pub state: JoinState,
}

#[derive(Debug, Deserialize)]
struct BotStatusResponse {
    state: JoinState,
}

/// HTTP client for the bot-joining service.
///
/// Every call carries a timeout; a hung remote call must never pin a
/// worker indefinitely.
#[derive(Clone)]
pub struct AttendeeClient {
    http: Client,
    join_endpoint: String,
}

impl AttendeeClient {
    /// Create a client for the given join endpoint
    /// (e.g. `https://app.attendee.dev/api/v1/bots`).
    pub fn new(join_endpoint: impl Into<String>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            join_endpoint: join_endpoint.into(),
        }
    }

    /// The configured join endpoint.
    pub fn join_endpoint(&self) -> &str {
        &self.join_endpoint
    }

    /// Ask the remote service to create a bot for the meeting.
    ///
    /// Success is HTTP 201 with `{id, state}`; anything else is a rejected
    /// attempt.
    pub async fn create_bot(
        &self,
        meeting_url: &str,
        bot_name: &str,
        api_key: &str,
    ) -> Result<CreatedBot, JoinError> {
        info!(meeting_url, bot_name, "requesting bot creation");

        let response = self
            .http
            .post(&self.join_endpoint)
            .header("Authorization", format!("Token {}", api_key))
            .json(&serde_json::json!({
                "meeting_url": meeting_url,
                "bot_name": bot_name,
            }))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() != 201 {
            let body = response.text().await.unwrap_or_default();
            return Err(JoinError::CreateRejected {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreatedBot = response
            .json()
            .await
            .map_err(|e| JoinError::InvalidResponse(e.to_string()))?;
        info!(meeting_url, bot_id = %created.id, state = %created.state, "bot created");
        Ok(created)
    }

    /// Poll the current state of a bot resource.
    pub async fn bot_state(&self, bot_id: &str, api_key: &str) -> Result<JoinState, JoinError> {
        let url = format!("{}/{}", self.join_endpoint, bot_id);
        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Token {}", api_key))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(JoinError::StatusCheckFailed {
                status: status.as_u16(),
            });
        }

        let body: BotStatusResponse = response
            .json()
            .await
            .map_err(|e| JoinError::InvalidResponse(e.to_string()))?;
        debug!(bot_id, state = %body.state, "polled bot state");
        Ok(body.state)
    }
}
