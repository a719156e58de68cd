//! # Tally
//!
//! Weekly metrics ingestion for an organization's SaaS tools. Once a week
//! Tally pulls attendance, check-ins, groups, email, video and task data
//! from their APIs, summarizes each source into per-week metric rows, and
//! upserts them into SQLite. A summary of the week, with year-over-year
//! deltas, can then be posted to chat.
//!
//! ## Features
//!
//! - **Idempotent writes**: re-running a week replaces its rows, never duplicates them
//! - **Source isolation**: one failing source never blocks the others
//! - **Backfill**: any number of past weeks, oldest first
//! - **Run log**: every attempt is recorded with its outcome
//!
//! ## Modules
//!
//! - [`period`]: Week boundaries in the organization's timezone
//! - [`sources`]: Adapters that fetch raw records from each API
//! - [`transform`]: Raw records to weekly summary rows
//! - [`storage`]: SQLite summary store, run log and credentials
//! - [`pipeline`]: Per-source runs, retries and the weekly scheduler
//! - [`publish`]: Weekly report rendering and chat posting
//! - [`api`]: REST API server with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tally::storage::SummaryStore;
//! use tally::period::Period;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SummaryStore::open(std::path::Path::new("./tally_data/tally.db"))?;
//!     let week = Period::from_week_start(tally::period::parse_date("2024-01-01")?);
//!
//!     for row in store.period_summaries(&week)? {
//!         println!("{} {} {} = {}", row.source, row.dimension, row.metric_name, row.metric_value);
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod credentials;
pub mod period;
pub mod pipeline;
pub mod publish;
pub mod sources;
pub mod storage;
pub mod transform;

// Re-export top-level types for convenience
pub use api::{build_router, serve, ApiError, AppState};

pub use config::{Config, ConfigError};

pub use period::{Period, PeriodError};

pub use pipeline::{Pipeline, RetryPolicy, RunReport, Scheduler, TriggerRequest};

pub use publish::{PeriodReport, Publisher};

pub use sources::{build_sources, Source, SourceError};

pub use storage::{
    MetricFamily, RunRecord, RunStatus, StorageError, StorageResult, SummaryFilter, SummaryStore,
    WeeklySummaryRecord,
};
