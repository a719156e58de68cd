//! Per-source Pipeline
//!
//! One run takes a single source through
//!
//! ```text
//! credential -> fetch (with retry) -> summarize -> upsert -> run log
//! ```
//!
//! for one period. Every failure is caught here, logged with the source,
//! period and error kind, and written to `pipeline_runs`. Nothing escapes to
//! the caller, so one source failing never affects another.

mod retry;
mod scheduler;

pub use retry::RetryPolicy;
pub use scheduler::{Scheduler, SourceState, SourceStatus, TriggerError, TriggerRequest};

use crate::credentials::{CredentialError, CredentialProvider};
use crate::period::Period;
use crate::sources::{Source, SourceError};
use crate::storage::{RunRecord, RunStatus, StorageError, SummaryStore, WeeklySummaryRecord};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a source run failed
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Run exceeded {0:?}")]
    Timeout(Duration),
}

impl PipelineError {
    /// Label stored in `pipeline_runs.error_kind`
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Credential(_) => "credential",
            PipelineError::Source(e) => e.kind(),
            PipelineError::Storage(StorageError::Write { .. }) => "storage_write",
            PipelineError::Storage(_) => "storage",
            PipelineError::Timeout(_) => "timeout",
        }
    }
}

/// Outcome of one source run for one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub source: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub status: RunStatus,
    pub records_written: usize,
    pub records_skipped: usize,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    /// Summaries a dry run would have written
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preview: Vec<WeeklySummaryRecord>,
    pub duration_ms: u64,
}

impl RunReport {
    /// A run that was not attempted
    pub fn skipped(source: &str, period: &Period, reason: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            period_start: period.start,
            period_end: period.end,
            status: RunStatus::Skipped,
            records_written: 0,
            records_skipped: 0,
            error_kind: Some("already_running".to_string()),
            error: Some(reason.into()),
            dry_run: false,
            preview: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

struct Outcome {
    written: usize,
    skipped: usize,
    preview: Vec<WeeklySummaryRecord>,
}

/// Shared context for source runs
pub struct Pipeline {
    credentials: Arc<CredentialProvider>,
    store: Arc<SummaryStore>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Pipeline {
    pub fn new(
        credentials: Arc<CredentialProvider>,
        store: Arc<SummaryStore>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            credentials,
            store,
            retry,
            timeout,
        }
    }

    pub fn store(&self) -> &Arc<SummaryStore> {
        &self.store
    }

    /// Run `source` for `period`. Never fails; the result is in the report.
    ///
    /// A dry run fetches and summarizes but writes neither summaries nor the
    /// run log.
    pub async fn run_source(&self, source: &dyn Source, period: &Period, dry_run: bool) -> RunReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        tracing::info!(source = %source.name(), period = %period, dry_run, "Starting source run");

        let result = match tokio::time::timeout(self.timeout, self.execute(source, period, dry_run))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout(self.timeout)),
        };

        let mut report = RunReport {
            source: source.name().to_string(),
            period_start: period.start,
            period_end: period.end,
            status: RunStatus::Succeeded,
            records_written: 0,
            records_skipped: 0,
            error_kind: None,
            error: None,
            dry_run,
            preview: Vec::new(),
            duration_ms: clock.elapsed().as_millis() as u64,
        };

        match result {
            Ok(outcome) => {
                report.records_written = outcome.written;
                report.records_skipped = outcome.skipped;
                report.preview = outcome.preview;
                tracing::info!(
                    source = %source.name(),
                    period = %period,
                    written = outcome.written,
                    skipped = outcome.skipped,
                    "Source run succeeded"
                );
            }
            Err(e) => {
                report.status = RunStatus::Failed;
                report.error_kind = Some(e.kind().to_string());
                report.error = Some(e.to_string());
                tracing::error!(
                    source = %source.name(),
                    period = %period,
                    kind = e.kind(),
                    error = %e,
                    "Source run failed, previous summaries left in place"
                );
            }
        }

        if !dry_run {
            let record = RunRecord {
                source: report.source.clone(),
                period_start: report.period_start,
                period_end: report.period_end,
                status: report.status,
                records_written: report.records_written,
                records_skipped: report.records_skipped,
                error_kind: report.error_kind.clone(),
                error: report.error.clone(),
                started_at,
                finished_at: Utc::now(),
            };
            if let Err(e) = self.store.record_run(&record) {
                tracing::error!(source = %source.name(), error = %e, "Failed to record run");
            }
        }

        report
    }

    async fn execute(
        &self,
        source: &dyn Source,
        period: &Period,
        dry_run: bool,
    ) -> Result<Outcome, PipelineError> {
        let credential = self.credentials.resolve(source.integration()).await?;

        let raw = self
            .retry
            .run(source.name(), || source.fetch(period, &credential))
            .await?;
        tracing::debug!(source = %source.name(), records = raw.len(), "Fetched raw records");

        let batch = source.summarize(period, &raw);
        let skipped = batch.skipped.len();

        if dry_run {
            return Ok(Outcome {
                written: 0,
                skipped,
                preview: batch.records,
            });
        }

        let written = self
            .store
            .upsert(source.family(), source.name(), period, &batch.records)?;

        Ok(Outcome {
            written,
            skipped,
            preview: Vec::new(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fake::{headcount, FakeSource, INTEGRATION};
    use super::*;
    use crate::credentials::Credential;
    use crate::sources::RawRecord;
    use crate::storage::SummaryFilter;
    use std::collections::BTreeMap;

    fn period() -> Period {
        Period::from_week_start(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    fn pipeline(timeout: Duration) -> Pipeline {
        let store = Arc::new(SummaryStore::open_in_memory().unwrap());
        store
            .save_credential(&Credential::api_key(INTEGRATION, "token"))
            .unwrap();
        let credentials = Arc::new(CredentialProvider::new(store.clone(), &BTreeMap::new()));
        Pipeline::new(credentials, store, RetryPolicy::none(), timeout)
    }

    fn total(pipeline: &Pipeline, source: &str, ministry: &str) -> Vec<f64> {
        pipeline
            .store()
            .query(&SummaryFilter::period(&period()).source(source).dimension(ministry))
            .unwrap()
            .into_iter()
            .filter(|r| r.metric_name == "total_attendance")
            .map(|r| r.metric_value)
            .collect()
    }

    #[tokio::test]
    async fn test_run_writes_summaries_and_run_log() {
        let pipeline = pipeline(Duration::from_secs(5));
        let source = FakeSource::ok("checkins", vec![headcount("Kids", 10.0), headcount("Kids", 5.0)]);

        let report = pipeline.run_source(&source, &period(), false).await;
        assert!(report.succeeded());
        assert_eq!(report.records_written, 4);
        assert_eq!(total(&pipeline, "checkins", "Kids"), vec![15.0]);

        let run = pipeline.store().last_run("checkins").unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(run.records_written, 4);
    }

    #[tokio::test]
    async fn test_rerun_overwrites_stored_period() {
        let pipeline = pipeline(Duration::from_secs(5));
        let source = FakeSource::ok("checkins", vec![headcount("Kids", 10.0), headcount("Kids", 5.0)]);
        pipeline.run_source(&source, &period(), false).await;

        source.set_outcome(Ok(vec![headcount("Kids", 20.0)]));
        let report = pipeline.run_source(&source, &period(), false).await;

        assert!(report.succeeded());
        assert_eq!(total(&pipeline, "checkins", "Kids"), vec![20.0]);
    }

    #[tokio::test]
    async fn test_auth_failure_keeps_previous_summary() {
        let pipeline = pipeline(Duration::from_secs(5));
        let source = FakeSource::ok("mailchimp", vec![headcount("Weekly", 7.0)]);
        pipeline.run_source(&source, &period(), false).await;

        source.set_outcome(Err(SourceError::Auth("401 Unauthorized".into())));
        let report = pipeline.run_source(&source, &period(), false).await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.error_kind.as_deref(), Some("auth"));
        assert_eq!(total(&pipeline, "mailchimp", "Weekly"), vec![7.0]);

        let run = pipeline.store().last_run("mailchimp").unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error_kind.as_deref(), Some("auth"));
    }

    #[tokio::test]
    async fn test_timeout_aborts_run() {
        let pipeline = pipeline(Duration::from_millis(20));
        let source = FakeSource::ok("slow", vec![headcount("Kids", 1.0)])
            .with_delay(Duration::from_secs(5));

        let report = pipeline.run_source(&source, &period(), false).await;
        assert_eq!(report.error_kind.as_deref(), Some("timeout"));
        assert!(total(&pipeline, "slow", "Kids").is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let pipeline = pipeline(Duration::from_secs(5));
        let source = FakeSource::ok("checkins", vec![headcount("Kids", 3.0)]);

        let report = pipeline.run_source(&source, &period(), true).await;
        assert!(report.succeeded());
        assert!(report.dry_run);
        assert_eq!(report.records_written, 0);
        assert!(report
            .preview
            .iter()
            .any(|r| r.metric_name == "total_attendance" && r.metric_value == 3.0));
        assert!(total(&pipeline, "checkins", "Kids").is_empty());
        assert!(pipeline.store().last_run("checkins").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let store = Arc::new(SummaryStore::open_in_memory().unwrap());
        let credentials = Arc::new(CredentialProvider::new(store.clone(), &BTreeMap::new()));
        let pipeline = Pipeline::new(credentials, store, RetryPolicy::none(), Duration::from_secs(5));
        let source = FakeSource::ok("checkins", vec![headcount("Kids", 3.0)]);

        let report = pipeline.run_source(&source, &period(), false).await;
        assert_eq!(report.error_kind.as_deref(), Some("credential"));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_records_are_counted() {
        let pipeline = pipeline(Duration::from_secs(5));
        let broken = RawRecord::Headcount {
            event_time_id: "x".into(),
            ministry: Some("Kids".into()),
            starts_at: Some("2024-01-01T15:30:00Z".into()),
            count: None,
        };
        let source = FakeSource::ok("checkins", vec![headcount("Kids", 4.0), broken]);

        let report = pipeline.run_source(&source, &period(), false).await;
        assert!(report.succeeded());
        assert_eq!(report.records_skipped, 1);
        assert_eq!(total(&pipeline, "checkins", "Kids"), vec![4.0]);
    }
}
