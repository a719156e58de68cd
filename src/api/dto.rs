//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::period::Period;
use crate::pipeline::{RunReport, SourceStatus};
use crate::publish::{ReportSection, TargetFailure};
use crate::storage::{RunRecord, WeeklySummaryRecord};

// ============================================
// SUMMARY DTOs
// ============================================

/// Query parameters for GET /summaries
#[derive(Debug, Default, Deserialize)]
pub struct SummariesParams {
    pub source: Option<String>,
    pub dimension: Option<String>,
    /// Exactly one week, by its first day
    pub week_start: Option<String>,
    /// Exactly one week, by its last day
    pub week_end: Option<String>,
    /// Weeks starting on or after this date
    pub from: Option<String>,
    /// Weeks starting on or before this date
    pub to: Option<String>,
    /// Output format: json (default) or csv
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SummariesResponse {
    pub count: usize,
    pub summaries: Vec<WeeklySummaryRecord>,
}

/// Week selector shared by dashboard and publish
#[derive(Debug, Default, Deserialize)]
pub struct WeekParams {
    pub week_start: Option<String>,
    pub week_end: Option<String>,
}

/// Dashboard widget set for one week
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub period: Period,
    pub prior_period: Period,
    /// One widget per source and dimension, metrics with YoY deltas
    pub widgets: Vec<ReportSection>,
    /// Enabled sources with nothing stored for the week
    pub missing_sources: Vec<String>,
}

// ============================================
// SOURCE & RUN DTOs
// ============================================

#[derive(Debug, Serialize)]
pub struct SourcesResponse {
    pub sources: Vec<SourceStatus>,
    pub next_run_at: Option<DateTime<Utc>>,
}

/// Query parameters for GET /runs
#[derive(Debug, Deserialize)]
pub struct RunsParams {
    pub source: Option<String>,
    #[serde(default = "default_runs_limit")]
    pub limit: usize,
}

fn default_runs_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct RunsResponse {
    pub runs: Vec<RunRecord>,
}

/// POST /runs body: manual re-run or backfill
#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    pub week_start: Option<String>,
    pub week_end: Option<String>,
    /// Backfill this many weeks ending at the selected week
    pub weeks: Option<u32>,
    pub source: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub periods: Vec<Period>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub reports: Vec<RunReport>,
}

// ============================================
// PUBLISH DTOs
// ============================================

#[derive(Debug, Default, Deserialize)]
pub struct PublishRequest {
    pub week_start: Option<String>,
    pub week_end: Option<String>,
    /// Render without posting
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub period: Period,
    pub message: String,
    pub delivered: Vec<String>,
    pub failed: Vec<TargetFailure>,
    pub dry_run: bool,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Full health status response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: healthy or unhealthy
    pub status: String,
    /// Storage status: ok or error
    pub storage: String,
    /// Number of enabled sources
    pub sources: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Version string
    pub version: String,
}
