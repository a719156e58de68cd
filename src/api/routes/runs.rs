//! Run Routes
//!
//! - GET /api/v1/runs - Run history, newest first
//! - POST /api/v1/runs - Manual re-run or backfill

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use super::resolve_week;
use crate::api::dto::{RunRequest, RunResponse, RunsParams, RunsResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::pipeline::TriggerRequest;
use crate::storage::RunStatus;

const MAX_RUNS_LIMIT: usize = 1000;

/// GET /api/v1/runs
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RunsParams>,
) -> ApiResult<Json<RunsResponse>> {
    if params.limit == 0 || params.limit > MAX_RUNS_LIMIT {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_RUNS_LIMIT
        )));
    }

    let runs = state
        .store
        .recent_runs(params.source.as_deref(), params.limit)?;
    Ok(Json(RunsResponse { runs }))
}

/// POST /api/v1/runs
///
/// Runs the selected week (default: previous complete week), or `weeks`
/// consecutive weeks ending with it, oldest first. Waits for completion.
pub async fn trigger_runs(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunRequest>,
) -> ApiResult<Json<RunResponse>> {
    let period = resolve_week(&state, request.week_start.as_deref(), request.week_end.as_deref())?;
    let periods = match request.weeks {
        Some(weeks) => period.backfill(weeks)?,
        None => vec![period],
    };

    tracing::info!(
        periods = periods.len(),
        source = ?request.source,
        dry_run = request.dry_run,
        "Manual run requested"
    );

    let reports = state
        .scheduler
        .trigger(TriggerRequest {
            periods: periods.clone(),
            source: request.source,
            dry_run: request.dry_run,
        })
        .await?;

    let count = |status: RunStatus| reports.iter().filter(|r| r.status == status).count();
    Ok(Json(RunResponse {
        periods,
        succeeded: count(RunStatus::Succeeded),
        failed: count(RunStatus::Failed),
        skipped: count(RunStatus::Skipped),
        reports,
    }))
}
