//! API Routes
//!
//! Route handlers organized by functionality.

pub mod health;
pub mod publish;
pub mod runs;
pub mod sources;
pub mod summaries;

use chrono::Utc;

use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::period::Period;

/// Week named by `week_start` or `week_end`, else the previous complete week
pub(crate) fn resolve_week(
    state: &AppState,
    week_start: Option<&str>,
    week_end: Option<&str>,
) -> ApiResult<Period> {
    Ok(Period::resolve(week_start, week_end, Utc::now(), state.offset())?)
}
