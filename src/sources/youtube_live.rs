//! YouTube livestreams
//!
//! A `search` for the channel's long videos published around the week,
//! followed by one `videos` lookup per 50 ids for statistics and duration.
//! Both calls use the same OAuth token as the analytics report.

use super::http;
use super::*;
use crate::config::LivestreamsSourceConfig;
use crate::transform;
use chrono::{Duration, FixedOffset};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

const MAX_PAGES: usize = 20;
const IDS_PER_LOOKUP: usize = 50;

pub struct LivestreamsSource {
    client: Client,
    config: LivestreamsSourceConfig,
    offset: FixedOffset,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default)]
    items: Vec<SearchItem>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct SearchItem {
    id: SearchId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    kind: String,
    video_id: Option<String>,
}

#[derive(Deserialize)]
struct VideoList {
    #[serde(default)]
    items: Vec<Video>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Video {
    id: String,
    #[serde(default)]
    snippet: Value,
    #[serde(default)]
    statistics: Value,
    #[serde(default)]
    content_details: Value,
}

impl Video {
    fn into_record(self) -> RawRecord {
        let text = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);
        // viewCount arrives as a decimal string
        let views = self.statistics.get("viewCount").and_then(|v| match v {
            Value::String(s) => s.parse::<f64>().ok(),
            other => other.as_f64(),
        });

        RawRecord::Livestream {
            title: text(&self.snippet, "title"),
            published_at: text(&self.snippet, "publishedAt"),
            duration: text(&self.content_details, "duration"),
            broadcast: text(&self.snippet, "liveBroadcastContent"),
            views,
            video_id: self.id,
        }
    }
}

impl LivestreamsSource {
    pub fn new(config: LivestreamsSourceConfig, offset: FixedOffset) -> Self {
        Self {
            client: http::client(),
            config,
            offset,
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    async fn search(&self, period: &Period, token: &str) -> Result<Vec<String>, SourceError> {
        // Widen by a day on each side; local-date filtering happens in summarize
        let after = Period::from_week_start(period.start - Duration::days(1)).start_rfc3339();
        let before = Period::from_week_end(period.end + Duration::days(1)).end_rfc3339();
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let mut request = self.client.get(self.url("search")).bearer_auth(token).query(&[
                ("part", "id"),
                ("channelId", self.config.channel_id.as_str()),
                ("type", "video"),
                ("order", "date"),
                ("videoDuration", "long"),
                ("maxResults", "50"),
                ("publishedAfter", after.as_str()),
                ("publishedBefore", before.as_str()),
            ]);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let page: SearchPage = http::read_json(http::send(request).await?).await?;
            ids.extend(
                page.items
                    .into_iter()
                    .filter(|item| item.id.kind == "youtube#video")
                    .filter_map(|item| item.id.video_id),
            );

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => return Ok(ids),
            }
        }

        Err(SourceError::Api(format!(
            "livestream search still had more pages after {}",
            MAX_PAGES
        )))
    }
}

#[async_trait]
impl Source for LivestreamsSource {
    fn name(&self) -> &str {
        "livestreams"
    }

    fn description(&self) -> &str {
        "Livestreams published on the YouTube channel, with views and duration"
    }

    fn integration(&self) -> &str {
        "youtube"
    }

    fn family(&self) -> MetricFamily {
        MetricFamily::Video
    }

    fn metrics_provided(&self) -> Vec<MetricDefinition> {
        vec![
            MetricDefinition::new("views", "views", "latest"),
            MetricDefinition::new("duration_secs", "seconds", "latest"),
            MetricDefinition::new("published_at", "unix_seconds", "latest"),
            MetricDefinition::new("livestream_count", "videos", "count"),
            MetricDefinition::new("total_views", "views", "sum"),
        ]
    }

    async fn fetch(
        &self,
        period: &Period,
        credential: &Credential,
    ) -> Result<Vec<RawRecord>, SourceError> {
        if self.config.channel_id.is_empty() {
            return Err(SourceError::Config("channel_id is not set".into()));
        }

        let ids = self.search(period, &credential.secret).await?;
        let mut records = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(IDS_PER_LOOKUP) {
            let joined = chunk.join(",");
            let response = http::send(
                self.client
                    .get(self.url("videos"))
                    .bearer_auth(&credential.secret)
                    .query(&[
                        ("part", "snippet,statistics,contentDetails"),
                        ("id", joined.as_str()),
                    ]),
            )
            .await?;
            let list: VideoList = http::read_json(response).await?;
            records.extend(list.items.into_iter().map(Video::into_record));
        }

        tracing::debug!(found = ids.len(), kept = records.len(), "Fetched livestream candidates");
        Ok(records)
    }

    fn summarize(&self, period: &Period, records: &[RawRecord]) -> SummaryBatch {
        transform::livestreams::summarize(
            self.name(),
            period,
            records,
            self.offset,
            self.config.min_duration_secs,
        )
    }
}
