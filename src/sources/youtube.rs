//! YouTube Analytics channel report
//!
//! One `reports` query per week with `dimensions=day`. Columns are located
//! by their header names rather than position.

use super::http;
use super::*;
use crate::config::YouTubeSourceConfig;
use crate::transform;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

const METRICS: &str = "averageViewDuration,views,subscribersGained,subscribersLost";

pub struct YouTubeSource {
    client: Client,
    config: YouTubeSourceConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    column_headers: Vec<ColumnHeader>,
    #[serde(default)]
    rows: Option<Vec<Vec<Value>>>,
}

#[derive(Deserialize)]
struct ColumnHeader {
    name: String,
}

impl YouTubeSource {
    pub fn new(config: YouTubeSourceConfig) -> Self {
        Self {
            client: http::client(),
            config,
        }
    }
}

#[async_trait]
impl Source for YouTubeSource {
    fn name(&self) -> &str {
        "youtube"
    }

    fn description(&self) -> &str {
        "YouTube channel watch time, views and subscriber changes"
    }

    fn integration(&self) -> &str {
        "youtube"
    }

    fn family(&self) -> MetricFamily {
        MetricFamily::Video
    }

    fn metrics_provided(&self) -> Vec<MetricDefinition> {
        vec![
            MetricDefinition::new("avg_watch_duration", "seconds", "average"),
            MetricDefinition::new("total_views", "views", "sum"),
            MetricDefinition::new("subscribers_gained", "subscribers", "sum"),
            MetricDefinition::new("subscribers_lost", "subscribers", "sum"),
            MetricDefinition::new("net_subscribers", "subscribers", "sum"),
        ]
    }

    async fn fetch(
        &self,
        period: &Period,
        credential: &Credential,
    ) -> Result<Vec<RawRecord>, SourceError> {
        let start = period.start.format("%Y-%m-%d").to_string();
        let end = period.end.format("%Y-%m-%d").to_string();

        let response = http::send(
            self.client
                .get(format!("{}/v2/reports", self.config.base_url.trim_end_matches('/')))
                .bearer_auth(&credential.secret)
                .query(&[
                    ("ids", "channel==MINE"),
                    ("startDate", start.as_str()),
                    ("endDate", end.as_str()),
                    ("metrics", METRICS),
                    ("dimensions", "day"),
                    ("sort", "day"),
                ]),
        )
        .await?;
        let report: Report = http::read_json(response).await?;

        let column = |name: &str| report.column_headers.iter().position(|h| h.name == name);
        let Some(day_col) = column("day") else {
            return Err(SourceError::Parse("report has no day column".into()));
        };
        let (avg, views, gained, lost) = (
            column("averageViewDuration"),
            column("views"),
            column("subscribersGained"),
            column("subscribersLost"),
        );

        let number = |row: &Vec<Value>, idx: Option<usize>| {
            idx.and_then(|i| row.get(i)).and_then(Value::as_f64)
        };

        Ok(report
            .rows
            .unwrap_or_default()
            .iter()
            .map(|row| RawRecord::VideoDay {
                day: row.get(day_col).and_then(Value::as_str).map(str::to_string),
                avg_view_duration: number(row, avg),
                views: number(row, views),
                subscribers_gained: number(row, gained),
                subscribers_lost: number(row, lost),
            })
            .collect())
    }

    fn summarize(&self, period: &Period, records: &[RawRecord]) -> SummaryBatch {
        transform::video::summarize(self.name(), period, records)
    }
}
