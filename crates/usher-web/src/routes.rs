//! Scheduler API routes.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::info;

use usher_scheduler::{JoinJob, Scheduler};

/// Shared state for the scheduler API.
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
}

/// Create the API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/scheduler/schedule-join-bot", post(schedule_join_bot))
        .route("/scheduler/scheduled-jobs", get(scheduled_jobs))
        .route("/scheduler/upcoming-events", get(upcoming_events))
        .route("/scheduler/stop-all-jobs", delete(stop_all_jobs))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ScheduleBotRequest {
    meeting_url: String,
    bot_name: String,
    meeting_time: String,
    meeting_end_time: String,
}

/// Parse a meeting time as RFC 3339, or as the calendar sweep's naive
/// `YYYY-MM-DDTHH:MM:SS` form (taken as UTC).
fn parse_meeting_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

async fn schedule_join_bot(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScheduleBotRequest>,
) -> impl IntoResponse {
    let Some(meeting_time) = parse_meeting_time(&request.meeting_time) else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": format!("invalid meeting_time: {}", request.meeting_time)})),
        );
    };
    let Some(meeting_end_time) = parse_meeting_time(&request.meeting_end_time) else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": format!("invalid meeting_end_time: {}", request.meeting_end_time)})),
        );
    };

    // Idempotent by meeting URL: a matching pending job is acknowledged
    // without touching it; a different trigger time replaces the job.
    if let Some(pending) = state.scheduler.get(&request.meeting_url).await
        && pending.run_at == meeting_time
    {
        info!(meeting_url = %request.meeting_url, "job already scheduled");
        return (
            StatusCode::OK,
            Json(json!({
                "message": "already scheduled",
                "meeting_url": request.meeting_url,
                "meeting_time": request.meeting_time,
                "meeting_end_time": request.meeting_end_time,
            })),
        );
    }

    state
        .scheduler
        .schedule(JoinJob::new(
            &request.meeting_url,
            &request.bot_name,
            meeting_time,
            meeting_end_time,
        ))
        .await;

    (
        StatusCode::OK,
        Json(json!({
            "message": "Job scheduled",
            "meeting_url": request.meeting_url,
            "meeting_time": request.meeting_time,
            "meeting_end_time": request.meeting_end_time,
        })),
    )
}

async fn scheduled_jobs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.scheduler.list_ids().await)
}

async fn upcoming_events(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.scheduler.upcoming().await)
}

async fn stop_all_jobs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.scheduler.cancel_all().await;
    Json(json!({"message": "All jobs stopped."}))
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "pending_jobs": state.scheduler.pending_count().await,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
