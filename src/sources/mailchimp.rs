//! Mailchimp campaign reports
//!
//! For every configured audience: list the campaigns sent during the period,
//! then pull the open and click rates from each campaign's report.

use super::http;
use super::*;
use crate::config::MailchimpSourceConfig;
use crate::transform;
use reqwest::Client;
use serde::Deserialize;

pub struct MailchimpSource {
    client: Client,
    config: MailchimpSourceConfig,
}

#[derive(Deserialize)]
struct CampaignList {
    #[serde(default)]
    campaigns: Vec<Campaign>,
}

#[derive(Deserialize)]
struct Campaign {
    id: Option<String>,
}

#[derive(Deserialize)]
struct Report {
    #[serde(default)]
    opens: Option<Opens>,
    #[serde(default)]
    clicks: Option<Clicks>,
}

#[derive(Deserialize)]
struct Opens {
    proxy_excluded_open_rate: Option<f64>,
}

#[derive(Deserialize)]
struct Clicks {
    click_rate: Option<f64>,
}

const REPORT_FIELDS: &str = "id,opens.proxy_excluded_open_rate,clicks.click_rate";

impl MailchimpSource {
    pub fn new(config: MailchimpSourceConfig) -> Self {
        Self {
            client: http::client(),
            config,
        }
    }

    async fn sent_campaigns(
        &self,
        base: &str,
        list_id: &str,
        period: &Period,
        api_key: &str,
    ) -> Result<Vec<String>, SourceError> {
        let since = period.start_rfc3339();
        let before = period.end_rfc3339();
        let response = http::send(
            self.client
                .get(format!("{}/campaigns", base))
                .basic_auth("tally", Some(api_key))
                .query(&[
                    ("status", "sent"),
                    ("list_id", list_id),
                    ("since_send_time", since.as_str()),
                    ("before_send_time", before.as_str()),
                    ("count", "1000"),
                ]),
        )
        .await?;

        let list: CampaignList = http::read_json(response).await?;
        Ok(list.campaigns.into_iter().filter_map(|c| c.id).collect())
    }

    async fn report(
        &self,
        base: &str,
        campaign_id: &str,
        api_key: &str,
    ) -> Result<Report, SourceError> {
        let response = http::send(
            self.client
                .get(format!("{}/reports/{}", base, urlencoding::encode(campaign_id)))
                .basic_auth("tally", Some(api_key))
                .query(&[("fields", REPORT_FIELDS)]),
        )
        .await?;
        http::read_json(response).await
    }
}

#[async_trait]
impl Source for MailchimpSource {
    fn name(&self) -> &str {
        "mailchimp"
    }

    fn description(&self) -> &str {
        "Mailchimp campaign open and click rates per audience"
    }

    fn integration(&self) -> &str {
        "mailchimp"
    }

    fn family(&self) -> MetricFamily {
        MetricFamily::Email
    }

    fn metrics_provided(&self) -> Vec<MetricDefinition> {
        vec![
            MetricDefinition::new("email_count", "campaigns", "count"),
            MetricDefinition::new("avg_open_rate", "percent", "average"),
            MetricDefinition::new("avg_click_rate", "percent", "average"),
        ]
    }

    async fn fetch(
        &self,
        period: &Period,
        credential: &Credential,
    ) -> Result<Vec<RawRecord>, SourceError> {
        if self.config.audiences.is_empty() {
            return Err(SourceError::Config("no audiences configured".into()));
        }

        let base = self.config.base_url();
        let mut records = Vec::new();

        for (audience, list_id) in &self.config.audiences {
            records.push(RawRecord::EmailAudience {
                audience: audience.clone(),
                list_id: list_id.clone(),
            });

            let campaigns = self
                .sent_campaigns(&base, list_id, period, &credential.secret)
                .await?;
            tracing::debug!(audience = %audience, campaigns = campaigns.len(), "Fetched sent campaigns");

            for campaign_id in campaigns {
                let report = match self.report(&base, &campaign_id, &credential.secret).await {
                    Ok(report) => report,
                    Err(SourceError::Api(e)) => {
                        tracing::warn!(campaign = %campaign_id, error = %e, "Skipping campaign without report");
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                records.push(RawRecord::CampaignReport {
                    audience: audience.clone(),
                    campaign_id,
                    open_rate: report.opens.and_then(|o| o.proxy_excluded_open_rate),
                    click_rate: report.clicks.and_then(|c| c.click_rate),
                });
            }
        }

        Ok(records)
    }

    fn summarize(&self, period: &Period, records: &[RawRecord]) -> SummaryBatch {
        transform::email::summarize(self.name(), period, records)
    }
}
