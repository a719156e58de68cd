//! Transform / Summarize
//!
//! Pure functions from raw source records to weekly summaries. Nothing here
//! performs I/O. A record that cannot be interpreted is skipped, logged and
//! reported in [`SummaryBatch::skipped`]; it never aborts the batch.

pub mod attendance;
pub mod checkins;
pub mod email;
pub mod groups;
pub mod livestreams;
pub mod tasks;
pub mod video;

use crate::storage::WeeklySummaryRecord;
use serde::Serialize;

/// Output of one summarize pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryBatch {
    pub records: Vec<WeeklySummaryRecord>,
    pub skipped: Vec<MalformedRecord>,
}

impl SummaryBatch {
    /// Record a skipped input and log it
    pub(crate) fn skip(&mut self, source: &str, record: impl Into<String>, reason: impl Into<String>) {
        let malformed = MalformedRecord {
            record: record.into(),
            reason: reason.into(),
        };
        tracing::warn!(
            source = %source,
            record = %malformed.record,
            reason = %malformed.reason,
            "Skipping malformed record"
        );
        self.skipped.push(malformed);
    }

    pub fn metric(&self, dimension: &str, metric_name: &str) -> Option<f64> {
        self.records
            .iter()
            .find(|r| r.dimension == dimension && r.metric_name == metric_name)
            .map(|r| r.metric_value)
    }
}

/// An input record that was dropped during summarizing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MalformedRecord {
    /// Identifies the record (row number, id)
    pub record: String,
    pub reason: String,
}

/// Round half away from zero to `places` decimals
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Parse a spreadsheet-style number ("1,204", " 87 ")
pub(crate) fn parse_count(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(42.3449, 2), 42.34);
        assert_eq!(round_to(66.6666, 2), 66.67);
        assert_eq!(round_to(1.23456, 3), 1.235);
        assert_eq!(round_to(10.0, 2), 10.0);
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("1,204"), Some(1204.0));
        assert_eq!(parse_count(" 87 "), Some(87.0));
        assert_eq!(parse_count(""), None);
        assert_eq!(parse_count("n/a"), None);
        assert_eq!(parse_count("NaN"), None);
    }

    #[test]
    fn test_skip_collects() {
        let mut batch = SummaryBatch::default();
        batch.skip("attendance", "row 3", "missing date");
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.skipped[0].reason, "missing date");
    }
}
