//! Summary Routes
//!
//! - GET /api/v1/summaries - Stored weekly summaries (JSON or CSV)
//! - GET /api/v1/dashboard - Widget set for one week with YoY deltas

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashSet;
use std::sync::Arc;

use super::resolve_week;
use crate::api::dto::{DashboardResponse, SummariesParams, SummariesResponse, WeekParams};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::period::parse_date;
use crate::storage::{SummaryFilter, WeeklySummaryRecord};

/// GET /api/v1/summaries
///
/// `week_start`/`week_end` select one week; otherwise `from`/`to` bound
/// the period starts. Without any of them every stored week is returned.
pub async fn list_summaries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SummariesParams>,
) -> ApiResult<Response> {
    let mut filter = if params.week_start.is_some() || params.week_end.is_some() {
        let period = resolve_week(&state, params.week_start.as_deref(), params.week_end.as_deref())?;
        SummaryFilter::period(&period)
    } else {
        SummaryFilter {
            from: params.from.as_deref().map(parse_date).transpose()?,
            to: params.to.as_deref().map(parse_date).transpose()?,
            ..Default::default()
        }
    };
    if let (Some(from), Some(to)) = (filter.from, filter.to) {
        if from > to {
            return Err(ApiError::Validation("from must not be after to".to_string()));
        }
    }
    filter.source = params.source;
    filter.dimension = params.dimension;

    let summaries = state.store.query(&filter)?;

    match params.format.as_deref().map(str::to_lowercase).as_deref() {
        None | Some("json") => Ok(Json(SummariesResponse {
            count: summaries.len(),
            summaries,
        })
        .into_response()),
        Some("csv") => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv")],
            format_csv(&summaries)?,
        )
            .into_response()),
        Some(other) => Err(ApiError::Validation(format!("Unknown format: {}", other))),
    }
}

fn format_csv(records: &[WeeklySummaryRecord]) -> ApiResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer
            .serialize(record)
            .map_err(|e| ApiError::Internal(format!("CSV encoding failed: {}", e)))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("CSV encoding failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| ApiError::Internal(e.to_string()))
}

/// GET /api/v1/dashboard
///
/// Defaults to the previous complete week.
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WeekParams>,
) -> ApiResult<Json<DashboardResponse>> {
    let period = resolve_week(&state, params.week_start.as_deref(), params.week_end.as_deref())?;
    let report = state.publisher.report(&period)?;

    let present: HashSet<&str> = report.sections.iter().map(|s| s.source.as_str()).collect();
    let missing_sources = state
        .scheduler
        .source_names()
        .into_iter()
        .filter(|name| !present.contains(name.as_str()))
        .collect();

    Ok(Json(DashboardResponse {
        period: report.period,
        prior_period: report.prior_period,
        widgets: report.sections,
        missing_sources,
    }))
}
