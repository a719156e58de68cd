//! Source Routes
//!
//! - GET /api/v1/sources - Per-source run state and last run

use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;

use crate::api::dto::SourcesResponse;
use crate::api::state::AppState;

/// GET /api/v1/sources
pub async fn list_sources(State(state): State<Arc<AppState>>) -> Json<SourcesResponse> {
    Json(SourcesResponse {
        sources: state.scheduler.status().await,
        next_run_at: state.scheduler.next_run_at(Utc::now()),
    })
}
