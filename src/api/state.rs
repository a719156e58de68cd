//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use crate::config::ApiConfig;
use crate::pipeline::Scheduler;
use crate::publish::Publisher;
use crate::storage::SummaryStore;
use chrono::FixedOffset;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Stored weekly summaries and the run log
    pub store: Arc<SummaryStore>,
    /// Source runs (manual and weekly)
    pub scheduler: Arc<Scheduler>,
    pub publisher: Arc<Publisher>,
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<SummaryStore>,
        scheduler: Arc<Scheduler>,
        publisher: Arc<Publisher>,
        config: ApiConfig,
    ) -> Self {
        Self {
            store,
            scheduler,
            publisher,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Offset that defines week boundaries
    pub fn offset(&self) -> FixedOffset {
        self.scheduler.offset()
    }
}

impl ApiConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
