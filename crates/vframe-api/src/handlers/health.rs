//! Health check handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::warn;

use crate::state::AppState;

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub queue: &'static str,
}

fn component(name: &str, result: Result<(), String>) -> &'static str {
    match result {
        Ok(()) => "UP",
        Err(e) => {
            warn!("Health check for {} failed: {}", name, e);
            "DOWN"
        }
    }
}

/// Banner returned on `GET /`.
#[derive(Debug, Serialize)]
pub struct BannerResponse {
    pub message: &'static str,
}

pub async fn root() -> Json<BannerResponse> {
    Json(BannerResponse {
        message: "vframe API: POST /upload to submit a video",
    })
}

/// Reports ledger and queue reachability.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (db, queue) = tokio::join!(state.ledger.ping(), state.publisher.ping());
    let database = component("database", db.map_err(|e| e.to_string()));
    let queue = component("queue", queue.map_err(|e| e.to_string()));

    let up = database == "UP" && queue == "UP";
    let status = if up { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(HealthResponse {
            status: if up { "UP" } else { "DOWN" },
            database,
            queue,
        }),
    )
}
