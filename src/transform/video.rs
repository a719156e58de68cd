//! Channel analytics for one week
//!
//! Dimension `channel`. `avg_watch_duration` is the whole-second mean of the
//! daily average view durations.

use super::SummaryBatch;
use crate::period::Period;
use crate::sources::RawRecord;
use crate::storage::WeeklySummaryRecord;
use chrono::NaiveDate;

pub const DIMENSION: &str = "channel";

pub fn summarize(source: &str, period: &Period, records: &[RawRecord]) -> SummaryBatch {
    let mut batch = SummaryBatch::default();
    let mut durations = Vec::new();
    let mut views = 0.0;
    let mut gained = 0.0;
    let mut lost = 0.0;

    for record in records {
        let RawRecord::VideoDay {
            day,
            avg_view_duration,
            views: day_views,
            subscribers_gained,
            subscribers_lost,
        } = record
        else {
            continue;
        };
        let label = format!("day {}", day.as_deref().unwrap_or("?"));

        let Some(date) = day
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        else {
            batch.skip(source, label, "missing or invalid day");
            continue;
        };
        if !period.contains(date) {
            continue;
        }

        let values = [*avg_view_duration, *day_views, *subscribers_gained, *subscribers_lost];
        let [Some(duration), Some(v), Some(g), Some(l)] = values else {
            batch.skip(source, label, "missing metric column");
            continue;
        };
        if [duration, v, g, l].iter().any(|x| !x.is_finite() || *x < 0.0) {
            batch.skip(source, label, "negative or non-numeric metric");
            continue;
        }

        durations.push(duration);
        views += v;
        gained += g;
        lost += l;
    }

    if durations.is_empty() {
        return batch;
    }

    let avg_watch = (durations.iter().sum::<f64>() / durations.len() as f64).trunc();

    for (metric, value) in [
        ("avg_watch_duration", avg_watch),
        ("total_views", views),
        ("subscribers_gained", gained),
        ("subscribers_lost", lost),
        ("net_subscribers", gained - lost),
    ] {
        batch
            .records
            .push(WeeklySummaryRecord::new(source, period, DIMENSION, metric, value));
    }

    batch
}
