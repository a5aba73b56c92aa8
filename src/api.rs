// src/api.rs
//! Manual-trigger HTTP surface. One POST kicks a full pipeline run and
//! reports stable numbers back; a run can never surface an error payload,
//! only a sentinel count of -1 when the run task itself dies.

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::error;

use crate::job::DailyNewsJob;

#[derive(Clone)]
pub struct AppState {
    pub job: Arc<DailyNewsJob>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/news/run", post(trigger_run))
        .with_state(state)
}

#[derive(serde::Serialize)]
pub struct RunResponse {
    pub success: bool,
    pub message: String,
    pub articles_processed: i64,
}

async fn trigger_run(State(state): State<AppState>) -> Json<RunResponse> {
    let job = state.job.clone();
    // Run in its own task so a panic anywhere in the pipeline surfaces
    // here as a JoinError instead of tearing the handler down.
    let handle = tokio::spawn(async move { job.run().await });
    match handle.await {
        Ok(outcome) => Json(RunResponse {
            success: true,
            message: outcome.status,
            articles_processed: outcome.delivered,
        }),
        Err(e) => {
            error!(error = ?e, "pipeline run task failed");
            Json(RunResponse {
                success: false,
                message: "pipeline run failed".to_string(),
                articles_processed: -1,
            })
        }
    }
}
