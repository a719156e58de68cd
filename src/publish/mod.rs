//! Publisher
//!
//! Reads the stored summaries for a week (and the same week a year earlier),
//! renders them as a markdown snapshot and posts it to every configured
//! target. A failing target is logged and skipped.

mod clickup;
pub mod format;
pub mod report;

pub use clickup::ClickUpChatTarget;
pub use report::{calc_yoy, MetricLine, PeriodReport, ReportSection};

use crate::config::PublishConfig;
use crate::credentials::{CredentialError, CredentialProvider};
use crate::period::Period;
use crate::storage::{StorageError, SummaryStore};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Nothing stored for {0}")]
    Empty(Period),

    #[error("Target misconfigured: {0}")]
    Config(String),

    #[error("Target rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Somewhere a rendered report can be posted
#[async_trait]
pub trait PublishTarget: Send + Sync {
    fn name(&self) -> &str;

    async fn post(&self, content: &str) -> Result<(), PublishError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetFailure {
    pub target: String,
    pub error: String,
}

/// Result of one publish
#[derive(Debug, Clone, Serialize)]
pub struct PublishSummary {
    pub period: Period,
    pub message: String,
    pub delivered: Vec<String>,
    pub failed: Vec<TargetFailure>,
}

pub struct Publisher {
    store: Arc<SummaryStore>,
    targets: Vec<Arc<dyn PublishTarget>>,
    dashboard_url: Option<String>,
}

impl Publisher {
    pub fn new(store: Arc<SummaryStore>, dashboard_url: Option<String>) -> Self {
        Self {
            store,
            targets: Vec::new(),
            dashboard_url,
        }
    }

    /// Publisher with every target enabled in `config`
    pub fn from_config(
        store: Arc<SummaryStore>,
        config: &PublishConfig,
        credentials: Arc<CredentialProvider>,
    ) -> Self {
        let mut publisher = Self::new(store, config.dashboard_url.clone());
        if config.clickup.enabled {
            publisher = publisher.with_target(Arc::new(ClickUpChatTarget::new(
                config.clickup.clone(),
                credentials,
            )));
        }
        publisher
    }

    pub fn with_target(mut self, target: Arc<dyn PublishTarget>) -> Self {
        self.targets.push(target);
        self
    }

    pub fn target_names(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.name().to_string()).collect()
    }

    /// Stored summaries for `period` paired with the prior year
    pub fn report(&self, period: &Period) -> Result<PeriodReport, PublishError> {
        let current = self.store.period_summaries(period)?;
        let prior = self.store.period_summaries(&period.year_ago())?;
        Ok(PeriodReport::build(*period, &current, &prior))
    }

    /// The message that would be posted for `period`
    pub fn render(&self, period: &Period) -> Result<String, PublishError> {
        let report = self.report(period)?;
        if report.is_empty() {
            return Err(PublishError::Empty(*period));
        }
        Ok(format::render(&report, self.dashboard_url.as_deref()))
    }

    /// Post the report for `period` to every target
    pub async fn publish(&self, period: &Period) -> Result<PublishSummary, PublishError> {
        let message = self.render(period)?;
        let mut summary = PublishSummary {
            period: *period,
            message,
            delivered: Vec::new(),
            failed: Vec::new(),
        };

        if self.targets.is_empty() {
            tracing::warn!(period = %period, "No publish targets configured");
        }

        for target in &self.targets {
            match target.post(&summary.message).await {
                Ok(()) => {
                    tracing::info!(target = %target.name(), period = %period, "Published report");
                    summary.delivered.push(target.name().to_string());
                }
                Err(e) => {
                    tracing::error!(target = %target.name(), period = %period, error = %e, "Publish target failed, skipping");
                    summary.failed.push(TargetFailure {
                        target: target.name().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MetricFamily, WeeklySummaryRecord};
    use chrono::NaiveDate;
    use std::sync::Mutex;

    struct Recording {
        name: &'static str,
        fail: bool,
        posted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PublishTarget for Recording {
        fn name(&self) -> &str {
            self.name
        }

        async fn post(&self, content: &str) -> Result<(), PublishError> {
            if self.fail {
                return Err(PublishError::Rejected {
                    status: 500,
                    body: "boom".into(),
                });
            }
            self.posted.lock().unwrap().push(content.to_string());
            Ok(())
        }
    }

    fn recording(name: &'static str, fail: bool) -> Arc<Recording> {
        Arc::new(Recording {
            name,
            fail,
            posted: Mutex::new(Vec::new()),
        })
    }

    fn period() -> Period {
        Period::from_week_start(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    fn store_with_data() -> Arc<SummaryStore> {
        let store = Arc::new(SummaryStore::open_in_memory().unwrap());
        let p = period();
        store
            .upsert(
                MetricFamily::Attendance,
                "checkins",
                &p,
                &[WeeklySummaryRecord::new("checkins", &p, "Kids", "total_attendance", 15.0)],
            )
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_failing_target_does_not_stop_others() {
        let broken = recording("broken", true);
        let chat = recording("chat", false);
        let publisher = Publisher::new(store_with_data(), None)
            .with_target(broken.clone())
            .with_target(chat.clone());

        let summary = publisher.publish(&period()).await.unwrap();
        assert_eq!(summary.delivered, vec!["chat".to_string()]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].target, "broken");

        let posted = chat.posted.lock().unwrap();
        assert_eq!(posted.len(), 1);
        assert!(posted[0].contains("*Check-ins: Kids*: Total = 15"));
    }

    #[tokio::test]
    async fn test_empty_period_is_not_posted() {
        let chat = recording("chat", false);
        let store = Arc::new(SummaryStore::open_in_memory().unwrap());
        let publisher = Publisher::new(store, None).with_target(chat.clone());

        let err = publisher.publish(&period()).await.unwrap_err();
        assert!(matches!(err, PublishError::Empty(_)));
        assert!(chat.posted.lock().unwrap().is_empty());
    }
}
