//! Tasks closed per list

use super::SummaryBatch;
use crate::period::Period;
use crate::sources::RawRecord;
use crate::storage::WeeklySummaryRecord;
use std::collections::{BTreeMap, HashSet};

/// Dimension holding the all-lists total
pub const TOTAL_DIMENSION: &str = "all";

const NO_LIST: &str = "No List";

pub fn summarize(source: &str, period: &Period, records: &[RawRecord]) -> SummaryBatch {
    let mut batch = SummaryBatch::default();
    let mut per_list: BTreeMap<String, f64> = BTreeMap::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let (from, until) = (period.start_millis(), period.end_millis_exclusive());

    for record in records {
        let RawRecord::Task {
            id,
            list,
            date_done,
        } = record
        else {
            continue;
        };

        let Some(done) = date_done.as_deref().and_then(|d| d.trim().parse::<i64>().ok()) else {
            batch.skip(source, format!("task {}", id), "missing or invalid date_done");
            continue;
        };
        if done < from || done >= until || !seen.insert(id) {
            continue;
        }

        let list = list
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(NO_LIST);
        *per_list.entry(list.to_string()).or_default() += 1.0;
    }

    let total: f64 = per_list.values().sum();
    batch.records.push(WeeklySummaryRecord::new(
        source,
        period,
        TOTAL_DIMENSION,
        "tasks_closed",
        total,
    ));
    for (list, count) in per_list {
        batch
            .records
            .push(WeeklySummaryRecord::new(source, period, list, "tasks_closed", count));
    }

    batch
}
