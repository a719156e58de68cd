//! Core data types for the summary store
//!
//! - `WeeklySummaryRecord`: one aggregated metric value for a source, week and dimension
//! - `MetricFamily`: which table a source's summaries live in
//! - `RunRecord`: audit entry for one pipeline run
//! - `SummaryFilter`: read-side query parameters

use crate::period::Period;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One aggregated metric value.
///
/// Unique per (source, period_start, dimension, metric_name). Writing the
/// same key again replaces the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySummaryRecord {
    /// Source that produced the value ("checkins", "mailchimp", ...)
    pub source: String,
    /// Monday of the covered week
    pub period_start: NaiveDate,
    /// Sunday of the covered week
    pub period_end: NaiveDate,
    /// Breakdown key: ministry, audience, list, "channel", "all"
    pub dimension: String,
    pub metric_name: String,
    pub metric_value: f64,
}

impl WeeklySummaryRecord {
    pub fn new(
        source: impl Into<String>,
        period: &Period,
        dimension: impl Into<String>,
        metric_name: impl Into<String>,
        metric_value: f64,
    ) -> Self {
        Self {
            source: source.into(),
            period_start: period.start,
            period_end: period.end,
            dimension: dimension.into(),
            metric_name: metric_name.into(),
            metric_value,
        }
    }

    pub fn period(&self) -> Period {
        Period {
            start: self.period_start,
            end: self.period_end,
        }
    }
}

/// Group of related metrics sharing one table
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MetricFamily {
    /// Adult and kids attendance (sheet rows, check-in headcounts)
    Attendance,
    /// Email campaign performance
    Email,
    /// Video / livestream analytics
    Video,
    /// Small-group participation
    Groups,
    /// Task throughput
    Tasks,
}

impl MetricFamily {
    pub fn all() -> &'static [MetricFamily] {
        &[
            MetricFamily::Attendance,
            MetricFamily::Email,
            MetricFamily::Video,
            MetricFamily::Groups,
            MetricFamily::Tasks,
        ]
    }

    /// Table holding this family's summaries
    pub fn table(&self) -> &'static str {
        match self {
            MetricFamily::Attendance => "attendance_summary",
            MetricFamily::Email => "email_summary",
            MetricFamily::Video => "video_summary",
            MetricFamily::Groups => "group_summary",
            MetricFamily::Tasks => "task_summary",
        }
    }
}

impl std::fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricFamily::Attendance => write!(f, "attendance"),
            MetricFamily::Email => write!(f, "email"),
            MetricFamily::Video => write!(f, "video"),
            MetricFamily::Groups => write!(f, "groups"),
            MetricFamily::Tasks => write!(f, "tasks"),
        }
    }
}

/// Outcome of a single source run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    /// Not attempted because the source was already running
    Skipped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(RunStatus::Succeeded),
            "failed" => Some(RunStatus::Failed),
            "skipped" => Some(RunStatus::Skipped),
            _ => None,
        }
    }
}

/// Audit entry for one source pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub source: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub status: RunStatus,
    pub records_written: usize,
    pub records_skipped: usize,
    /// Short machine-readable kind ("auth", "rate_limited", "storage_write", ...)
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Read-side filter for stored summaries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryFilter {
    pub source: Option<String>,
    pub dimension: Option<String>,
    /// Include periods starting on or after this date
    pub from: Option<NaiveDate>,
    /// Include periods starting on or before this date
    pub to: Option<NaiveDate>,
}

impl SummaryFilter {
    /// Exactly one week
    pub fn period(period: &Period) -> Self {
        Self {
            from: Some(period.start),
            to: Some(period.start),
            ..Default::default()
        }
    }

    /// Builder method: restrict to one source
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Builder method: restrict to one dimension
    pub fn dimension(mut self, dimension: impl Into<String>) -> Self {
        self.dimension = Some(dimension.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_tables_are_distinct() {
        let mut tables: Vec<&str> = MetricFamily::all().iter().map(|f| f.table()).collect();
        tables.sort();
        tables.dedup();
        assert_eq!(tables.len(), MetricFamily::all().len());
    }

    #[test]
    fn test_run_status_round_trip() {
        for status in [RunStatus::Succeeded, RunStatus::Failed, RunStatus::Skipped] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("bogus"), None);
    }

    #[test]
    fn test_filter_builder() {
        let period = Period::from_week_start(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let filter = SummaryFilter::period(&period).source("checkins").dimension("Kids");
        assert_eq!(filter.from, filter.to);
        assert_eq!(filter.source.as_deref(), Some("checkins"));
        assert_eq!(filter.dimension.as_deref(), Some("Kids"));
    }
}
