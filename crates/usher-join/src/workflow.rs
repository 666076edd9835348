//! The bounded create-then-poll join workflow.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, warn};

use usher_store::{ClaimOutcome, JoinState, StateStore};

use crate::{AttendeeClient, CreatedBot, CredentialResolver, JoinError};

/// Retry and polling bounds for one workflow invocation.
///
/// All four values are deploy-time constants; together they define the
/// maximum wall-clock time one invocation may occupy
/// (`create_attempts * create_retry_delay + max_polls * poll_interval`).
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Bot creation attempts before giving up.
    pub create_attempts: u32,
    /// Fixed delay between creation attempts.
    pub create_retry_delay: Duration,
    /// Status polls before giving up.
    pub max_polls: u32,
    /// Fixed delay between status polls.
    pub poll_interval: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            create_attempts: 3,
            create_retry_delay: Duration::from_secs(10),
            max_polls: 10,
            poll_interval: Duration::from_secs(10),
        }
    }
}

/// Drives one meeting's bot to a terminal state.
pub struct JoinWorkflow {
    store: Arc<dyn StateStore>,
    client: AttendeeClient,
    resolver: Arc<CredentialResolver>,
    config: WorkflowConfig,
}

impl JoinWorkflow {
    pub fn new(
        store: Arc<dyn StateStore>,
        client: AttendeeClient,
        resolver: Arc<CredentialResolver>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            store,
            client,
            resolver,
            config,
        }
    }

    /// Run one join attempt for a meeting.
    ///
    /// Aborts before any remote call if another attempt holds the claim,
    /// is active, or already succeeded. On pre-creation failures the
    /// entry-guard claim is rolled back so the meeting stays claimable.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, meeting_url: &str, bot_name: &str) -> Result<JoinState, JoinError> {
        match self
            .store
            .claim_meeting(meeting_url, JoinState::Requested)
            .await?
        {
            ClaimOutcome::AlreadyActive(state) => {
                info!(meeting_url, %state, "join already in progress or succeeded, aborting");
                return Err(JoinError::AlreadyActive(state));
            }
            ClaimOutcome::Claimed => {}
        }

        // A missing credential will not fix itself on retry
        let api_key = match self.resolver.resolve(bot_name).await {
            Ok(key) => key,
            Err(error) => {
                error!(meeting_url, bot_name, %error, "credential resolution failed, aborting");
                self.release_claim(meeting_url).await;
                return Err(error.into());
            }
        };

        let created = match self
            .create_with_retry(meeting_url, bot_name, &api_key)
            .await
        {
            Ok(created) => created,
            Err(error) => {
                self.release_claim(meeting_url).await;
                return Err(error);
            }
        };

        self.persist_state(meeting_url, created.state.clone()).await;
        self.poll_until_terminal(meeting_url, bot_name, &created, &api_key)
            .await
    }

    /// Create the bot resource, retrying up to the configured bound.
    async fn create_with_retry(
        &self,
        meeting_url: &str,
        bot_name: &str,
        api_key: &str,
    ) -> Result<CreatedBot, JoinError> {
        for attempt in 1..=self.config.create_attempts {
            match self.client.create_bot(meeting_url, bot_name, api_key).await {
                Ok(created) => return Ok(created),
                Err(error) => {
                    warn!(
                        meeting_url,
                        bot_name,
                        attempt,
                        max_attempts = self.config.create_attempts,
                        %error,
                        "bot creation attempt failed"
                    );
                    if attempt < self.config.create_attempts {
                        sleep(self.config.create_retry_delay).await;
                    }
                }
            }
        }

        error!(meeting_url, bot_name, "bot creation attempts exhausted");
        Err(JoinError::CreateExhausted {
            attempts: self.config.create_attempts,
        })
    }

    /// Poll the bot's state until success, fatal error, or budget
    /// exhaustion. Every observed state is persisted; failed polls count
    /// against the budget.
    async fn poll_until_terminal(
        &self,
        meeting_url: &str,
        bot_name: &str,
        created: &CreatedBot,
        api_key: &str,
    ) -> Result<JoinState, JoinError> {
        let mut last = created.state.clone();

        for poll in 1..=self.config.max_polls {
            match self.client.bot_state(&created.id, api_key).await {
                Ok(state) => {
                    last = state.clone();
                    self.persist_state(meeting_url, state.clone()).await;

                    if state.is_success() {
                        info!(meeting_url, bot_name, bot_id = %created.id, %state, "bot joined meeting");
                        return Ok(state);
                    }
                    if state == JoinState::FatalError {
                        error!(meeting_url, bot_name, bot_id = %created.id, "bot reported fatal error");
                        return Err(JoinError::RemoteFatal {
                            bot_id: created.id.clone(),
                        });
                    }
                }
                Err(error) => {
                    warn!(meeting_url, bot_id = %created.id, poll, %error, "status poll failed");
                }
            }

            if poll < self.config.max_polls {
                sleep(self.config.poll_interval).await;
            }
        }

        // State stays at its last observed value, not rolled back
        error!(
            meeting_url,
            bot_name,
            bot_id = %created.id,
            polls = self.config.max_polls,
            last = %last,
            "poll budget exhausted without join"
        );
        Err(JoinError::PollBudgetExhausted {
            polls: self.config.max_polls,
            last,
        })
    }

    /// Persist an observed state; a failed write is logged and the workflow
    /// proceeds (other processes fall back to their own observations).
    async fn persist_state(&self, meeting_url: &str, state: JoinState) {
        if let Err(error) = self.store.set_meeting_state(meeting_url, state).await {
            warn!(meeting_url, %error, "failed to persist meeting state");
        }
    }

    /// Roll back the entry-guard claim after a pre-creation abort.
    async fn release_claim(&self, meeting_url: &str) {
        if let Err(error) = self.store.clear_meeting_state(meeting_url).await {
            warn!(meeting_url, %error, "failed to release meeting claim");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use usher_store::MemoryStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MEETING: &str = "https://meet.example/abc";

    fn test_config() -> WorkflowConfig {
        WorkflowConfig {
            create_attempts: 2,
            create_retry_delay: Duration::from_millis(1),
            max_polls: 4,
            poll_interval: Duration::from_millis(1),
        }
    }

    fn workflow(store: Arc<MemoryStore>, server_uri: &str, config: WorkflowConfig) -> JoinWorkflow {
        let client = AttendeeClient::new(format!("{}/bots", server_uri));
        let resolver = CredentialResolver::new(store.clone(), None, None).with_overrides(
            HashMap::from([("Bot-A".to_string(), "key-123".to_string())]),
        );
        JoinWorkflow::new(store, client, Arc::new(resolver), config)
    }

    async fn mount_create(server: &MockServer, state: &str) {
        Mock::given(method("POST"))
            .and(path("/bots"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "b1",
                "state": state,
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_success_after_three_polls() {
        let server = MockServer::start().await;
        mount_create(&server, "joining").await;

        // First two polls report joining, the third joined
        Mock::given(method("GET"))
            .and(path("/bots/b1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "joining"})),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bots/b1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "joined"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let workflow = workflow(store.clone(), &server.uri(), test_config());

        let state = workflow.run(MEETING, "Bot-A").await.unwrap();
        assert_eq!(state, JoinState::Joined);
        assert_eq!(
            store.meeting_state(MEETING).await.unwrap(),
            Some(JoinState::Joined)
        );
    }

    #[tokio::test]
    async fn test_poll_budget_exhausted_leaves_last_state() {
        let server = MockServer::start().await;
        mount_create(&server, "joining").await;

        Mock::given(method("GET"))
            .and(path("/bots/b1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "joining"})),
            )
            .expect(4)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let workflow = workflow(store.clone(), &server.uri(), test_config());

        let err = workflow.run(MEETING, "Bot-A").await.unwrap_err();
        match err {
            JoinError::PollBudgetExhausted { polls, last } => {
                assert_eq!(polls, 4);
                assert_eq!(last, JoinState::Joining);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Last observed state survives, not rolled back
        assert_eq!(
            store.meeting_state(MEETING).await.unwrap(),
            Some(JoinState::Joining)
        );
    }

    #[tokio::test]
    async fn test_entry_guard_aborts_without_remote_calls() {
        let server = MockServer::start().await;

        // The creation endpoint must never be hit
        Mock::given(method("POST"))
            .and(path("/bots"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        store
            .set_meeting_state(MEETING, JoinState::Joining)
            .await
            .unwrap();

        let workflow = workflow(store.clone(), &server.uri(), test_config());
        let err = workflow.run(MEETING, "Bot-A").await.unwrap_err();

        assert!(matches!(
            err,
            JoinError::AlreadyActive(JoinState::Joining)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_runs_create_one_bot() {
        let server = MockServer::start().await;

        // A slow creation keeps the first workflow between its claim and
        // its first persisted bot state while the second one starts
        Mock::given(method("POST"))
            .and(path("/bots"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({
                        "id": "b1",
                        "state": "joining",
                    }))
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bots/b1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"state": "joined"})),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let first = workflow(store.clone(), &server.uri(), test_config());
        let second = workflow(store.clone(), &server.uri(), test_config());

        let (a, b) = tokio::join!(first.run(MEETING, "Bot-A"), second.run(MEETING, "Bot-A"));

        // One workflow wins the claim and joins; the other aborts on the
        // claim marker without creating a second bot (expect(1) above)
        let (won, blocked) = if a.is_ok() { (a, b) } else { (b, a) };
        assert_eq!(won.unwrap(), JoinState::Joined);
        assert!(matches!(
            blocked.unwrap_err(),
            JoinError::AlreadyActive(JoinState::Requested)
        ));
    }

    #[tokio::test]
    async fn test_credential_failure_aborts_before_create_and_writes_no_state() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/bots"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        // No override for this bot, no endpoint: resolution must fail
        let client = AttendeeClient::new(format!("{}/bots", server.uri()));
        let resolver = CredentialResolver::new(store.clone(), None, None);
        let workflow =
            JoinWorkflow::new(store.clone(), client, Arc::new(resolver), test_config());

        let err = workflow.run(MEETING, "Bot-B").await.unwrap_err();
        assert!(matches!(err, JoinError::Credential(_)));
        // The claim was rolled back: no state written
        assert_eq!(store.meeting_state(MEETING).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_creation_retries_within_bound_then_releases_claim() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/bots"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(2)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let workflow = workflow(store.clone(), &server.uri(), test_config());

        let err = workflow.run(MEETING, "Bot-A").await.unwrap_err();
        assert!(matches!(err, JoinError::CreateExhausted { attempts: 2 }));
        // Meeting stays claimable for a later attempt
        assert_eq!(store.meeting_state(MEETING).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_polling() {
        let server = MockServer::start().await;
        mount_create(&server, "joining").await;

        Mock::given(method("GET"))
            .and(path("/bots/b1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"state": "fatal_error"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let workflow = workflow(store.clone(), &server.uri(), test_config());

        let err = workflow.run(MEETING, "Bot-A").await.unwrap_err();
        assert!(matches!(err, JoinError::RemoteFatal { .. }));
        assert_eq!(
            store.meeting_state(MEETING).await.unwrap(),
            Some(JoinState::FatalError)
        );
    }

    #[tokio::test]
    async fn test_failed_polls_count_against_budget() {
        let server = MockServer::start().await;
        mount_create(&server, "joining").await;

        // Every poll errors at the HTTP level; the budget still bounds them
        Mock::given(method("GET"))
            .and(path("/bots/b1"))
            .respond_with(ResponseTemplate::new(502))
            .expect(4)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let workflow = workflow(store.clone(), &server.uri(), test_config());

        let err = workflow.run(MEETING, "Bot-A").await.unwrap_err();
        match err {
            JoinError::PollBudgetExhausted { polls, last } => {
                assert_eq!(polls, 4);
                // Nothing newer was observed than the creation state
                assert_eq!(last, JoinState::Joining);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
