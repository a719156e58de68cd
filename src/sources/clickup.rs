//! ClickUp closed tasks
//!
//! Pages through the team task search filtered on `date_done`.

use super::http;
use super::*;
use crate::config::ClickUpSourceConfig;
use crate::transform;
use reqwest::Client;
use serde::Deserialize;

const MAX_PAGES: u32 = 100;

pub struct ClickUpTasksSource {
    client: Client,
    config: ClickUpSourceConfig,
}

#[derive(Deserialize)]
struct TaskPage {
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    last_page: Option<bool>,
}

#[derive(Deserialize)]
struct Task {
    id: String,
    date_done: Option<String>,
    list: Option<ListRef>,
}

#[derive(Deserialize)]
struct ListRef {
    name: Option<String>,
}

impl ClickUpTasksSource {
    pub fn new(config: ClickUpSourceConfig) -> Self {
        Self {
            client: http::client(),
            config,
        }
    }
}

#[async_trait]
impl Source for ClickUpTasksSource {
    fn name(&self) -> &str {
        "clickup"
    }

    fn description(&self) -> &str {
        "ClickUp tasks closed per list"
    }

    fn integration(&self) -> &str {
        "clickup"
    }

    fn family(&self) -> MetricFamily {
        MetricFamily::Tasks
    }

    fn metrics_provided(&self) -> Vec<MetricDefinition> {
        vec![MetricDefinition::new("tasks_closed", "tasks", "count")]
    }

    async fn fetch(
        &self,
        period: &Period,
        credential: &Credential,
    ) -> Result<Vec<RawRecord>, SourceError> {
        if self.config.team_id.is_empty() {
            return Err(SourceError::Config("team_id is not set".into()));
        }

        let url = format!(
            "{}/api/v2/team/{}/task",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.config.team_id)
        );
        let done_after = (period.start_millis() - 1).to_string();
        let done_before = period.end_millis_exclusive().to_string();
        let mut records = Vec::new();

        for page in 0..MAX_PAGES {
            let page_str = page.to_string();
            let response = http::send(
                self.client
                    .get(&url)
                    .header("Authorization", &credential.secret)
                    .query(&[
                        ("include_closed", "true"),
                        ("subtasks", "true"),
                        ("date_done_gt", done_after.as_str()),
                        ("date_done_lt", done_before.as_str()),
                        ("page", page_str.as_str()),
                    ]),
            )
            .await?;
            let body: TaskPage = http::read_json(response).await?;
            let empty = body.tasks.is_empty();

            records.extend(body.tasks.into_iter().map(|t| RawRecord::Task {
                id: t.id,
                list: t.list.and_then(|l| l.name),
                date_done: t.date_done,
            }));

            if empty || body.last_page.unwrap_or(true) {
                return Ok(records);
            }
        }

        Err(SourceError::Api(format!(
            "task listing still had more pages after {}",
            MAX_PAGES
        )))
    }

    fn summarize(&self, period: &Period, records: &[RawRecord]) -> SummaryBatch {
        transform::tasks::summarize(self.name(), period, records)
    }
}
