//! Adult attendance from spreadsheet rows
//!
//! Dimension `adult`. Rows dated outside the period are ignored; rows with a
//! bad date or count are skipped as malformed.

use super::{parse_count, round_to, SummaryBatch};
use crate::period::Period;
use crate::sources::RawRecord;
use crate::storage::WeeklySummaryRecord;
use chrono::NaiveDate;

pub const DIMENSION: &str = "adult";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y"];

struct Row {
    chair_count: Option<f64>,
    a930: f64,
    a1100: f64,
}

pub fn summarize(source: &str, period: &Period, records: &[RawRecord]) -> SummaryBatch {
    let mut batch = SummaryBatch::default();
    let mut rows = Vec::new();

    for record in records {
        let RawRecord::SheetRow {
            row,
            date,
            chair_count,
            attendance_930,
            attendance_1100,
        } = record
        else {
            continue;
        };
        let label = format!("row {}", row);

        let Some(date) = date.as_deref().and_then(parse_sheet_date) else {
            batch.skip(source, label, "missing or invalid date");
            continue;
        };
        if !period.contains(date) {
            continue;
        }

        let (Some(a930), Some(a1100)) = (
            attendance_930.as_deref().and_then(parse_count),
            attendance_1100.as_deref().and_then(parse_count),
        ) else {
            batch.skip(source, label, "missing or invalid service count");
            continue;
        };

        rows.push(Row {
            chair_count: chair_count.as_deref().and_then(parse_count),
            a930,
            a1100,
        });
    }

    if rows.is_empty() {
        return batch;
    }

    let a930: f64 = rows.iter().map(|r| r.a930).sum();
    let a1100: f64 = rows.iter().map(|r| r.a1100).sum();
    let total = a930 + a1100;
    let chairs = rows.iter().filter_map(|r| r.chair_count).last();

    let mut push = |metric: &str, value: f64| {
        batch
            .records
            .push(WeeklySummaryRecord::new(source, period, DIMENSION, metric, value));
    };

    push("attendance_930", a930);
    push("attendance_1100", a1100);
    push("total_attendance", total);

    if let Some(chairs) = chairs.filter(|c| *c > 0.0) {
        push("chair_count", chairs);
        push("percent_capacity_930", round_to(a930 / chairs * 100.0, 2));
        push("percent_capacity_1100", round_to(a1100 / chairs * 100.0, 2));
    }
    if total > 0.0 {
        push("percent_distribution_930", round_to(a930 / total * 100.0, 2));
        push("percent_distribution_1100", round_to(a1100 / total * 100.0, 2));
    }

    batch
}

fn parse_sheet_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(n: usize, date: &str, chairs: &str, a930: &str, a1100: &str) -> RawRecord {
        RawRecord::SheetRow {
            row: n,
            date: Some(date.to_string()),
            chair_count: Some(chairs.to_string()),
            attendance_930: Some(a930.to_string()),
            attendance_1100: Some(a1100.to_string()),
        }
    }

    fn period() -> Period {
        Period::from_week_start(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    #[test]
    fn test_summary_metrics() {
        let records = vec![
            row(2, "2023-12-31", "400", "100", "100"),
            row(3, "2024-01-07", "400", "150", "250"),
        ];
        let batch = summarize("attendance", &period(), &records);

        assert!(batch.skipped.is_empty());
        assert_eq!(batch.metric(DIMENSION, "attendance_930"), Some(150.0));
        assert_eq!(batch.metric(DIMENSION, "total_attendance"), Some(400.0));
        assert_eq!(batch.metric(DIMENSION, "percent_capacity_930"), Some(37.5));
        assert_eq!(batch.metric(DIMENSION, "percent_capacity_1100"), Some(62.5));
        assert_eq!(batch.metric(DIMENSION, "percent_distribution_1100"), Some(62.5));
        assert_eq!(batch.metric(DIMENSION, "chair_count"), Some(400.0));
    }

    #[test]
    fn test_malformed_row_is_skipped() {
        let records = vec![
            row(2, "2024-01-07", "300", "120", "80"),
            row(3, "not a date", "300", "1", "1"),
            row(4, "01/07/2024", "300", "lots", "1"),
        ];
        let batch = summarize("attendance", &period(), &records);

        assert_eq!(batch.skipped.len(), 2);
        assert_eq!(batch.metric(DIMENSION, "total_attendance"), Some(200.0));
    }

    #[test]
    fn test_zero_chairs_omits_capacity() {
        let batch = summarize("attendance", &period(), &[row(2, "2024-01-07", "0", "10", "0")]);
        assert_eq!(batch.metric(DIMENSION, "percent_capacity_930"), None);
        assert_eq!(batch.metric(DIMENSION, "percent_distribution_930"), Some(100.0));
    }

    #[test]
    fn test_no_rows_in_period() {
        let batch = summarize("attendance", &period(), &[row(2, "2024-02-04", "1", "1", "1")]);
        assert!(batch.records.is_empty());
        assert!(batch.skipped.is_empty());
    }
}
