//! Storage Gateway
//!
//! Persists weekly summaries, the pipeline run log and integration
//! credentials in a single SQLite file.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          SummaryStore                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  attendance_summary │ email_summary │ video_summary │ ...       │
//! │      UNIQUE(source, period_start, dimension, metric_name)       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  pipeline_runs (append-only)  │  credentials (one per integration) │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The store is the only writer of persisted state. Source adapters hand
//! their summaries to it one batch per source and period.

mod error;
mod store;
mod types;

pub use error::{StorageError, StorageResult};
pub use store::SummaryStore;
pub use types::{MetricFamily, RunRecord, RunStatus, SummaryFilter, WeeklySummaryRecord};
