//! Source Adapters
//!
//! One adapter per external system:
//! - Google Sheets (adult attendance rows)
//! - Mailchimp (campaign reports per audience)
//! - Planning Center (check-in headcounts, small-group memberships)
//! - YouTube Analytics (daily channel report)
//! - YouTube Data API (livestreams published in the week)
//! - ClickUp (closed tasks)
//!
//! Adapters own no persistent state. They turn one week of upstream data
//! into loosely validated [`RawRecord`]s; shape problems inside a record are
//! left for the transform step to flag.

mod clickup;
mod http;
mod mailchimp;
mod planning_center;
mod sheets;
mod youtube;
mod youtube_live;

pub use clickup::ClickUpTasksSource;
pub use mailchimp::MailchimpSource;
pub use planning_center::{CheckinsSource, GroupsSource};
pub use sheets::SheetsAttendanceSource;
pub use youtube::YouTubeSource;
pub use youtube_live::LivestreamsSource;

use crate::config::Config;
use crate::credentials::Credential;
use crate::period::{offset_from_hours, Period};
use crate::storage::MetricFamily;
use crate::transform::SummaryBatch;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Common trait for all source adapters
#[async_trait]
pub trait Source: Send + Sync {
    /// Unique name, used as the `source` column of stored summaries
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// Credential this source authenticates with
    fn integration(&self) -> &str;

    /// Table family its summaries are stored in
    fn family(&self) -> MetricFamily;

    /// Metrics this source produces
    fn metrics_provided(&self) -> Vec<MetricDefinition>;

    /// Pull raw records for one period
    async fn fetch(
        &self,
        period: &Period,
        credential: &Credential,
    ) -> Result<Vec<RawRecord>, SourceError>;

    /// Reduce raw records to weekly summaries. Pure; never fails.
    fn summarize(&self, period: &Period, records: &[RawRecord]) -> SummaryBatch;
}

/// Definition of a metric provided by a source
#[derive(Debug, Clone, Serialize)]
pub struct MetricDefinition {
    pub name: String,
    pub unit: String,
    pub aggregation: String,
}

impl MetricDefinition {
    pub(crate) fn new(name: &str, unit: &str, aggregation: &str) -> Self {
        Self {
            name: name.to_string(),
            unit: unit.to_string(),
            aggregation: aggregation.to_string(),
        }
    }
}

/// One upstream record, typed per source but not yet validated
#[derive(Debug, Clone, PartialEq)]
pub enum RawRecord {
    /// Spreadsheet row; cells are kept as text
    SheetRow {
        row: usize,
        date: Option<String>,
        chair_count: Option<String>,
        attendance_930: Option<String>,
        attendance_1100: Option<String>,
    },
    /// A configured audience, present even when it sent nothing
    EmailAudience { audience: String, list_id: String },
    /// Rates are fractions (0.42 = 42%)
    CampaignReport {
        audience: String,
        campaign_id: String,
        open_rate: Option<f64>,
        click_rate: Option<f64>,
    },
    /// Headcount for one event time
    Headcount {
        event_time_id: String,
        ministry: Option<String>,
        starts_at: Option<String>,
        count: Option<f64>,
    },
    /// One person's check-in, used to spot first-time attendees
    CheckIn {
        id: String,
        ministry: Option<String>,
        checked_in_at: Option<String>,
        person_id: Option<String>,
        person_created_at: Option<String>,
    },
    Group {
        id: String,
        name: String,
        group_type: Option<String>,
        archived: bool,
    },
    Membership {
        group_id: String,
        person_id: Option<String>,
        role: Option<String>,
    },
    /// One day of the channel analytics report
    VideoDay {
        day: Option<String>,
        avg_view_duration: Option<f64>,
        views: Option<f64>,
        subscribers_gained: Option<f64>,
        subscribers_lost: Option<f64>,
    },
    /// A video from the channel's livestream search
    Livestream {
        video_id: String,
        title: Option<String>,
        published_at: Option<String>,
        /// ISO 8601 duration, e.g. `PT1H12M5S`
        duration: Option<String>,
        views: Option<f64>,
        /// `live`, `upcoming` or `none`
        broadcast: Option<String>,
    },
    /// A closed task; `date_done` is epoch milliseconds as text
    Task {
        id: String,
        list: Option<String>,
        date_done: Option<String>,
    },
}

/// Errors that can occur while fetching from a source
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited, retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Source misconfigured: {0}")]
    Config(String),
}

impl SourceError {
    /// Worth retrying after a delay
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::RateLimited { .. } | SourceError::Unavailable(_)
        )
    }

    /// Short label recorded in the run log
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Auth(_) => "auth",
            SourceError::RateLimited { .. } => "rate_limited",
            SourceError::Unavailable(_) => "unavailable",
            SourceError::Api(_) => "api",
            SourceError::Parse(_) => "parse",
            SourceError::Config(_) => "config",
        }
    }
}

/// Build every source enabled in `config`
pub fn build_sources(config: &Config) -> Vec<Arc<dyn Source>> {
    let offset = offset_from_hours(config.schedule.utc_offset_hours);
    let sources = &config.sources;
    let mut out: Vec<Arc<dyn Source>> = Vec::new();

    if sources.attendance.enabled {
        out.push(Arc::new(SheetsAttendanceSource::new(sources.attendance.clone())));
    }
    if sources.mailchimp.enabled {
        out.push(Arc::new(MailchimpSource::new(sources.mailchimp.clone())));
    }
    if sources.checkins.enabled {
        out.push(Arc::new(CheckinsSource::new(sources.checkins.clone(), offset)));
    }
    if sources.groups.enabled {
        out.push(Arc::new(GroupsSource::new(sources.groups.clone())));
    }
    if sources.youtube.enabled {
        out.push(Arc::new(YouTubeSource::new(sources.youtube.clone())));
    }
    if sources.livestreams.enabled {
        out.push(Arc::new(LivestreamsSource::new(sources.livestreams.clone(), offset)));
    }
    if sources.clickup.enabled {
        out.push(Arc::new(ClickUpTasksSource::new(sources.clickup.clone())));
    }

    out
}
