//! Google Sheets adult attendance
//!
//! Reads the attendance tab (`B` date, `C` chair count, `D` 9:30 count,
//! `E` 11:00 count) with a bearer token.

use super::http;
use super::*;
use crate::config::SheetsSourceConfig;
use crate::transform;
use reqwest::Client;
use serde::Deserialize;

pub struct SheetsAttendanceSource {
    client: Client,
    config: SheetsSourceConfig,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

/// First sheet row covered by the configured range (A2)
const FIRST_ROW: usize = 2;

impl SheetsAttendanceSource {
    pub fn new(config: SheetsSourceConfig) -> Self {
        Self {
            client: http::client(),
            config,
        }
    }

    fn values_url(&self) -> String {
        let range = format!("{}!{}", self.config.sheet_name, self.config.range);
        format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.spreadsheet_id,
            urlencoding::encode(&range)
        )
    }
}

fn cell(row: &[String], idx: usize) -> Option<String> {
    row.get(idx)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

#[async_trait]
impl Source for SheetsAttendanceSource {
    fn name(&self) -> &str {
        "attendance"
    }

    fn description(&self) -> &str {
        "Adult service attendance from the Google Sheets tally sheet"
    }

    fn integration(&self) -> &str {
        "google_sheets"
    }

    fn family(&self) -> MetricFamily {
        MetricFamily::Attendance
    }

    fn metrics_provided(&self) -> Vec<MetricDefinition> {
        vec![
            MetricDefinition::new("attendance_930", "people", "sum"),
            MetricDefinition::new("attendance_1100", "people", "sum"),
            MetricDefinition::new("total_attendance", "people", "sum"),
            MetricDefinition::new("chair_count", "chairs", "last"),
            MetricDefinition::new("percent_capacity_930", "percent", "ratio"),
            MetricDefinition::new("percent_capacity_1100", "percent", "ratio"),
            MetricDefinition::new("percent_distribution_930", "percent", "ratio"),
            MetricDefinition::new("percent_distribution_1100", "percent", "ratio"),
        ]
    }

    async fn fetch(
        &self,
        _period: &Period,
        credential: &Credential,
    ) -> Result<Vec<RawRecord>, SourceError> {
        if self.config.spreadsheet_id.is_empty() {
            return Err(SourceError::Config("spreadsheet_id is not set".into()));
        }

        let response = http::send(
            self.client
                .get(self.values_url())
                .bearer_auth(&credential.secret),
        )
        .await?;
        let body: ValueRange = http::read_json(response).await?;

        Ok(body
            .values
            .iter()
            .enumerate()
            .filter(|(_, row)| row.iter().any(|c| !c.trim().is_empty()))
            .map(|(i, row)| RawRecord::SheetRow {
                row: i + FIRST_ROW,
                date: cell(row, 1),
                chair_count: cell(row, 2),
                attendance_930: cell(row, 3),
                attendance_1100: cell(row, 4),
            })
            .collect())
    }

    fn summarize(&self, period: &Period, records: &[RawRecord]) -> SummaryBatch {
        transform::attendance::summarize(self.name(), period, records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mockito::Server;

    fn source(base_url: String) -> SheetsAttendanceSource {
        SheetsAttendanceSource::new(SheetsSourceConfig {
            enabled: true,
            base_url,
            spreadsheet_id: "sheet-1".to_string(),
            sheet_name: "Adult Attendance".to_string(),
            range: "A2:E".to_string(),
        })
    }

    fn period() -> Period {
        Period::from_week_start(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    #[tokio::test]
    async fn test_fetch_rows() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v4/spreadsheets/sheet-1/values/Adult%20Attendance%21A2%3AE")
            .match_header("authorization", "Bearer token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "range": "'Adult Attendance'!A2:E40",
                    "values": [
                        ["w1", "2023-12-31", "400", "120", "180"],
                        [],
                        ["w2", "2024-01-07", "400", "150", "250"],
                        ["w3", "2024-01-14", "400"]
                    ]
                }"#,
            )
            .create_async()
            .await;

        let src = source(server.url());
        let records = src
            .fetch(&period(), &Credential::api_key("google_sheets", "token"))
            .await
            .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(
            records[1],
            RawRecord::SheetRow {
                row: 4,
                date: Some("2024-01-07".into()),
                chair_count: Some("400".into()),
                attendance_930: Some("150".into()),
                attendance_1100: Some("250".into()),
            }
        );

        let batch = src.summarize(&period(), &records);
        assert_eq!(batch.metric("adult", "total_attendance"), Some(400.0));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_spreadsheet_id() {
        let mut src = source("http://127.0.0.1:9".to_string());
        src.config.spreadsheet_id.clear();
        let err = src
            .fetch(&period(), &Credential::api_key("google_sheets", "t"))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Config(_)));
    }

    #[tokio::test]
    async fn test_expired_token_is_auth_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let err = source(server.url())
            .fetch(&period(), &Credential::api_key("google_sheets", "bad"))
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Auth(_)));
    }
}
