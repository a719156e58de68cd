//! Publish Routes
//!
//! - POST /api/v1/publish - Post the weekly snapshot now

use axum::{extract::State, Json};
use std::sync::Arc;

use super::resolve_week;
use crate::api::dto::{PublishRequest, PublishResponse};
use crate::api::error::ApiResult;
use crate::api::state::AppState;

/// POST /api/v1/publish
///
/// Target failures are reported in the body, not as an error status.
pub async fn publish_now(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PublishRequest>,
) -> ApiResult<Json<PublishResponse>> {
    let period = resolve_week(&state, request.week_start.as_deref(), request.week_end.as_deref())?;

    if request.dry_run {
        return Ok(Json(PublishResponse {
            period,
            message: state.publisher.render(&period)?,
            delivered: Vec::new(),
            failed: Vec::new(),
            dry_run: true,
        }));
    }

    let summary = state.publisher.publish(&period).await?;
    Ok(Json(PublishResponse {
        period: summary.period,
        message: summary.message,
        delivered: summary.delivered,
        failed: summary.failed,
        dry_run: false,
    }))
}
