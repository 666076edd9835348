//! End-to-end tests: scheduling engine firing the join workflow against a
//! mocked bot-joining service, with state agreed through the shared store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use usher_join::{AttendeeClient, CredentialResolver, JoinWorkflow, WorkflowConfig};
use usher_scheduler::{JobExecutor, JoinJob, Scheduler};
use usher_store::{JoinState, MemoryStore, StateStore};

const MEETING: &str = "https://meet.example/abc";

fn build_executor(store: Arc<MemoryStore>, server_uri: &str) -> JobExecutor {
    let client = AttendeeClient::new(format!("{}/bots", server_uri));
    let resolver = CredentialResolver::new(store.clone(), None, None).with_overrides(
        HashMap::from([("Bot-A".to_string(), "key-123".to_string())]),
    );
    let workflow = Arc::new(JoinWorkflow::new(
        store,
        client,
        Arc::new(resolver),
        WorkflowConfig {
            create_attempts: 2,
            create_retry_delay: Duration::from_millis(5),
            max_polls: 5,
            poll_interval: Duration::from_millis(5),
        },
    ));

    Box::new(move |job| {
        let workflow = workflow.clone();
        Box::pin(async move {
            workflow
                .run(&job.meeting_url, &job.bot_name)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
    })
}

async fn wait_for_state(store: &MemoryStore, meeting_url: &str, want: JoinState) {
    for _ in 0..200 {
        if store.meeting_state(meeting_url).await.unwrap() == Some(want.clone()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!(
        "timed out waiting for {meeting_url} to reach {want}, last: {:?}",
        store.meeting_state(meeting_url).await.unwrap()
    );
}

#[tokio::test]
async fn test_due_job_fires_workflow_to_joined() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "b1",
            "state": "joining",
        })))
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
    let scheduler = Arc::new(Scheduler::new());
    let now = chrono::Utc::now();
    scheduler
        .schedule(JoinJob::new(
            MEETING,
            "Bot-A",
            now,
            now + chrono::Duration::hours(1),
        ))
        .await;

    let executor = build_executor(store.clone(), &server.uri());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_scheduler = scheduler.clone();
    let handle = tokio::spawn(async move {
        loop_scheduler.run(shutdown_rx, executor).await;
    });

    wait_for_state(&store, MEETING, JoinState::Joined).await;
    // The job fired exactly once and is gone
    assert!(!scheduler.is_scheduled(MEETING).await);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_duplicate_registration_runs_one_workflow() {
    let server = MockServer::start().await;

    // Creation must happen exactly once even though the meeting was
    // registered twice before firing
    Mock::given(method("POST"))
        .and(path("/bots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "b1",
            "state": "joining",
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bots/b1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"state": "joined_recording"})),
        )
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let scheduler = Arc::new(Scheduler::new());
    let now = chrono::Utc::now();
    for _ in 0..2 {
        scheduler
            .schedule(JoinJob::new(
                MEETING,
                "Bot-A",
                now,
                now + chrono::Duration::hours(1),
            ))
            .await;
    }
    assert_eq!(scheduler.pending_count().await, 1);

    let executor = build_executor(store.clone(), &server.uri());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_scheduler = scheduler.clone();
    let handle = tokio::spawn(async move {
        loop_scheduler.run(shutdown_rx, executor).await;
    });

    wait_for_state(&store, MEETING, JoinState::JoinedRecording).await;

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_second_worker_defers_to_active_attempt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/bots"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    // One shared store, one meeting already mid-join from another worker
    let store = Arc::new(MemoryStore::new());
    store
        .set_meeting_state(MEETING, JoinState::Joining)
        .await
        .unwrap();

    let client = AttendeeClient::new(format!("{}/bots", server.uri()));
    let resolver = CredentialResolver::new(store.clone(), None, None)
        .with_default_key(Some("key-123".to_string()));
    let workflow = JoinWorkflow::new(
        store.clone(),
        client,
        Arc::new(resolver),
        WorkflowConfig::default(),
    );

    let err = workflow.run(MEETING, "Bot-A").await.unwrap_err();
    assert!(err.to_string().contains("already active"));
    assert_eq!(
        store.meeting_state(MEETING).await.unwrap(),
        Some(JoinState::Joining)
    );
}
