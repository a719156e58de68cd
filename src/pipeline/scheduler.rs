//! Weekly Scheduler
//!
//! Owns the enabled sources and their run state. The background loop wakes up
//! every `check_interval_secs`, and once per week (at the configured weekday
//! and local time) runs every source for the previous complete week, then
//! publishes the report. Manual runs and backfills go through [`Scheduler::trigger`].

use super::{Pipeline, RunReport};
use crate::config::ScheduleConfig;
use crate::period::{offset_from_hours, Period};
use crate::publish::Publisher;
use crate::sources::{MetricDefinition, Source};
use crate::storage::{MetricFamily, RunRecord};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Run state of one source
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SourceState {
    Idle,
    Running {
        period: Period,
        since: DateTime<Utc>,
    },
}

/// Current status of a source
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub description: String,
    pub integration: String,
    pub family: MetricFamily,
    pub state: SourceState,
    pub last_run: Option<RunRecord>,
    /// Newest week with stored summaries; older than the last run when that failed
    pub latest_period: Option<Period>,
    pub metrics: Vec<MetricDefinition>,
}

/// A manual run or backfill
#[derive(Debug, Clone)]
pub struct TriggerRequest {
    /// Processed in the given order
    pub periods: Vec<Period>,
    /// Restrict to one source by name
    pub source: Option<String>,
    pub dry_run: bool,
}

impl TriggerRequest {
    pub fn period(period: Period) -> Self {
        Self {
            periods: vec![period],
            source: None,
            dry_run: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("Unknown source: {0}")]
    UnknownSource(String),
}

pub struct Scheduler {
    pipeline: Arc<Pipeline>,
    sources: Vec<Arc<dyn Source>>,
    states: RwLock<HashMap<String, SourceState>>,
    publisher: Option<Arc<Publisher>>,
    config: ScheduleConfig,
    offset: FixedOffset,
    /// Monday of the week whose weekly run has already fired
    last_fired: RwLock<Option<NaiveDate>>,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, sources: Vec<Arc<dyn Source>>, config: ScheduleConfig) -> Self {
        let states = sources
            .iter()
            .map(|s| (s.name().to_string(), SourceState::Idle))
            .collect();

        Self {
            pipeline,
            sources,
            states: RwLock::new(states),
            publisher: None,
            offset: offset_from_hours(config.utc_offset_hours),
            config,
            last_fired: RwLock::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Publish the report after every weekly run
    pub fn with_publisher(mut self, publisher: Arc<Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Status of every source, in run order
    pub async fn status(&self) -> Vec<SourceStatus> {
        let states = self.states.read().await;
        let mut out = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let store = self.pipeline.store();
            let last_run = store.last_run(source.name()).unwrap_or_else(|e| {
                tracing::warn!(source = %source.name(), error = %e, "Failed to read last run");
                None
            });
            let latest_period = store.latest_period(source.name()).unwrap_or_else(|e| {
                tracing::warn!(source = %source.name(), error = %e, "Failed to read latest period");
                None
            });
            out.push(SourceStatus {
                name: source.name().to_string(),
                description: source.description().to_string(),
                integration: source.integration().to_string(),
                family: source.family(),
                state: states
                    .get(source.name())
                    .cloned()
                    .unwrap_or(SourceState::Idle),
                last_run,
                latest_period,
                metrics: source.metrics_provided(),
            });
        }

        out
    }

    /// Run the requested sources for each period.
    ///
    /// Periods run one after another; within a period all selected sources
    /// run concurrently. A source already running is reported as skipped.
    pub async fn trigger(&self, request: TriggerRequest) -> Result<Vec<RunReport>, TriggerError> {
        let selected: Vec<&Arc<dyn Source>> = match &request.source {
            Some(name) => {
                let found: Vec<_> = self.sources.iter().filter(|s| s.name() == name).collect();
                if found.is_empty() {
                    return Err(TriggerError::UnknownSource(name.clone()));
                }
                found
            }
            None => self.sources.iter().collect(),
        };

        let mut reports = Vec::new();
        for period in &request.periods {
            let runs = selected
                .iter()
                .map(|source| self.run_one(&***source, period, request.dry_run));
            reports.extend(join_all(runs).await);
        }

        Ok(reports)
    }

    async fn run_one(&self, source: &dyn Source, period: &Period, dry_run: bool) -> RunReport {
        {
            let mut states = self.states.write().await;
            if let Some(SourceState::Running { period: current, .. }) = states.get(source.name()) {
                tracing::warn!(
                    source = %source.name(),
                    running = %current,
                    requested = %period,
                    "Source already running, skipping"
                );
                return RunReport::skipped(
                    source.name(),
                    period,
                    format!("already running for {}", current),
                );
            }
            states.insert(
                source.name().to_string(),
                SourceState::Running {
                    period: *period,
                    since: Utc::now(),
                },
            );
        }

        let report = self.pipeline.run_source(source, period, dry_run).await;

        self.states
            .write()
            .await
            .insert(source.name().to_string(), SourceState::Idle);
        report
    }

    /// This week's trigger time in the local offset
    fn trigger_time(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let week = Period::week_containing(now.with_timezone(&self.offset).date_naive());
        let day = week.start + Duration::days(self.config.weekday().num_days_from_monday() as i64);
        let time = NaiveTime::from_hms_opt(self.config.hour.min(23), self.config.minute.min(59), 0)
            .unwrap_or_default();
        self.offset
            .from_local_datetime(&day.and_time(time))
            .single()
            .map(|t| t.with_timezone(&Utc))
    }

    /// When the weekly run fires next
    pub fn next_run_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let this_week = self.trigger_time(now)?;
        if this_week > now {
            Some(this_week)
        } else {
            Some(this_week + Duration::weeks(1))
        }
    }

    /// Fire the weekly run if it is due. Returns the reports when it ran.
    pub async fn tick(&self, now: DateTime<Utc>) -> Option<Vec<RunReport>> {
        let fire_at = self.trigger_time(now)?;
        if now < fire_at {
            return None;
        }

        let week = Period::week_containing(now.with_timezone(&self.offset).date_naive()).start;
        {
            let mut last_fired = self.last_fired.write().await;
            if *last_fired == Some(week) {
                return None;
            }
            *last_fired = Some(week);
        }

        let period = Period::previous_complete(now, self.offset);
        if self.already_recorded(&period) {
            tracing::info!(period = %period, "Weekly run already recorded, not repeating");
            return None;
        }

        tracing::info!(period = %period, sources = self.sources.len(), "Starting weekly run");
        let reports = self.trigger(TriggerRequest::period(period)).await.ok()?;

        let failed = reports.iter().filter(|r| !r.succeeded()).count();
        tracing::info!(period = %period, failed, "Weekly run finished");

        if let Some(publisher) = &self.publisher {
            match publisher.publish(&period).await {
                Ok(summary) => tracing::info!(
                    period = %period,
                    delivered = summary.delivered.len(),
                    failed = summary.failed.len(),
                    "Published weekly report"
                ),
                Err(e) => tracing::error!(period = %period, error = %e, "Weekly publish failed"),
            }
        }

        Some(reports)
    }

    /// Every source already has a run logged for `period` (daemon restarted
    /// after the weekly run)
    fn already_recorded(&self, period: &Period) -> bool {
        !self.sources.is_empty()
            && self.sources.iter().all(|s| {
                matches!(
                    self.pipeline.store().last_run(s.name()),
                    Ok(Some(run)) if run.period_start == period.start
                )
            })
    }

    /// Start the weekly trigger loop
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let scheduler = self.clone();

        tokio::spawn(async move {
            let every = std::time::Duration::from_secs(scheduler.config.check_interval_secs.max(1));
            let mut interval = tokio::time::interval(every);

            loop {
                interval.tick().await;

                if !scheduler.running.load(Ordering::SeqCst) {
                    break;
                }

                scheduler.tick(Utc::now()).await;
            }
        })
    }

    /// Stop the trigger loop after its current tick
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
