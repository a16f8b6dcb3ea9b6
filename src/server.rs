//! HTTP trigger surface for the bill inbox.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tracing::{info, warn};

use crate::pipeline::RunQueue;

/// Build the Axum router with the inbox trigger and health routes.
pub fn inbox_routes(queue: RunQueue) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/inbox", post(trigger_run))
        .with_state(queue)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "bill-inbox"
    }))
}

/// Accept a run request. The run itself happens on the worker.
async fn trigger_run(State(queue): State<RunQueue>) -> impl IntoResponse {
    match queue.try_enqueue() {
        Ok(trigger) => {
            info!(requested_at = %trigger.requested_at, "Inbox run requested");
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "status": "queued",
                    "requested_at": trigger.requested_at,
                })),
            )
        }
        Err(e) => {
            warn!(error = %e, "Inbox run rejected");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}
