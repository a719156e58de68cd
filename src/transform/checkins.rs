//! Check-in headcounts per ministry
//!
//! Each headcount is assigned to a service slot by its local start time:
//!
//! | slot   | window (local)  |
//! |--------|-----------------|
//! | `930`  | 08:00 - 10:15   |
//! | `1100` | 10:15 - 12:30   |
//! | `1630` | 15:15 - 17:30   |
//!
//! Counts outside every window still contribute to `total_attendance`.
//! Student ministries meet only in the evening, so all of their counts land
//! in `1630` regardless of start time.
//!
//! Individual check-ins are used only to find first-time attendees: a
//! person whose profile was created on the local day they checked in. Kids
//! ministries report `new_kids_<slot>` and `total_new_kids`; student
//! ministries report `new_students`. A person counts once per slot.

use super::SummaryBatch;
use crate::period::Period;
use crate::sources::RawRecord;
use crate::storage::WeeklySummaryRecord;
use chrono::{DateTime, FixedOffset, NaiveTime};
use std::collections::{BTreeMap, HashSet};

/// Service slots in match order
const SLOTS: &[(&str, (u32, u32), (u32, u32))] = &[
    ("1630", (15, 15), (17, 30)),
    ("930", (8, 0), (10, 15)),
    ("1100", (10, 15), (12, 30)),
];

const EVENING_SLOT: &str = "1630";

#[derive(Default)]
struct Tally {
    /// At least one headcount was seen
    counted: bool,
    total: f64,
    slots: BTreeMap<&'static str, f64>,
    /// At least one individual check-in was seen
    checked_in: bool,
    new_total: f64,
    new_by_slot: BTreeMap<&'static str, f64>,
}

pub fn summarize(
    source: &str,
    period: &Period,
    records: &[RawRecord],
    offset: FixedOffset,
    student_ministries: &[String],
) -> SummaryBatch {
    let mut batch = SummaryBatch::default();
    let mut ministries: BTreeMap<String, Tally> = BTreeMap::new();
    let mut seen: HashSet<(&str, String, &'static str)> = HashSet::new();
    let is_student = |ministry: &str| {
        student_ministries
            .iter()
            .any(|s| s.trim().eq_ignore_ascii_case(ministry))
    };
    let local_time = |raw: &Option<String>| {
        raw.as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&offset))
    };

    for record in records {
        match record {
            RawRecord::Headcount {
                event_time_id,
                ministry,
                starts_at,
                count,
            } => {
                let label = format!("event_time {}", event_time_id);

                let Some(ministry) = ministry.as_deref().map(str::trim).filter(|m| !m.is_empty()) else {
                    batch.skip(source, label, "no ministry");
                    continue;
                };
                let Some(count) = count.filter(|c| c.is_finite() && *c >= 0.0) else {
                    batch.skip(source, label, "missing or negative count");
                    continue;
                };
                let Some(local) = local_time(starts_at) else {
                    batch.skip(source, label, "missing or invalid start time");
                    continue;
                };
                if !period.contains(local.date_naive()) {
                    continue;
                }

                let slot = if is_student(ministry) {
                    Some(EVENING_SLOT)
                } else {
                    service_slot(local.time())
                };
                let tally = ministries.entry(ministry.to_string()).or_default();
                tally.counted = true;
                tally.total += count;
                if let Some(slot) = slot {
                    *tally.slots.entry(slot).or_default() += count;
                }
            }
            RawRecord::CheckIn {
                id,
                ministry,
                checked_in_at,
                person_id,
                person_created_at,
            } => {
                let label = format!("check_in {}", id);

                let Some(ministry) = ministry.as_deref().map(str::trim).filter(|m| !m.is_empty()) else {
                    batch.skip(source, label, "no ministry");
                    continue;
                };
                let Some(local) = local_time(checked_in_at) else {
                    batch.skip(source, label, "missing or invalid check-in time");
                    continue;
                };
                if !period.contains(local.date_naive()) {
                    continue;
                }
                let Some(person) = person_id.as_deref().filter(|p| !p.is_empty()) else {
                    batch.skip(source, label, "no person");
                    continue;
                };

                let tally = ministries.entry(ministry.to_string()).or_default();
                tally.checked_in = true;

                let first_visit = local_time(person_created_at)
                    .map_or(false, |created| created.date_naive() == local.date_naive());
                let slot = if is_student(ministry) {
                    Some(EVENING_SLOT)
                } else {
                    service_slot(local.time())
                };
                let Some(slot) = slot.filter(|_| first_visit) else {
                    continue;
                };
                if !seen.insert((person, ministry.to_string(), slot)) {
                    continue;
                }

                tally.new_total += 1.0;
                *tally.new_by_slot.entry(slot).or_default() += 1.0;
            }
            _ => continue,
        }
    }

    for (ministry, tally) in ministries {
        let mut push = |metric: String, value: f64| {
            batch
                .records
                .push(WeeklySummaryRecord::new(source, period, &ministry, metric, value));
        };

        if tally.counted {
            push("total_attendance".to_string(), tally.total);
            for (slot, _, _) in SLOTS.iter().rev() {
                push(
                    format!("attendance_{}", slot),
                    tally.slots.get(slot).copied().unwrap_or(0.0),
                );
            }
        }

        if tally.checked_in {
            if is_student(&ministry) {
                push("new_students".to_string(), tally.new_total);
            } else {
                push("total_new_kids".to_string(), tally.new_total);
                for (slot, _, _) in SLOTS.iter().rev() {
                    push(
                        format!("new_kids_{}", slot),
                        tally.new_by_slot.get(slot).copied().unwrap_or(0.0),
                    );
                }
            }
        }
    }

    batch
}

/// Slot label for a local start time, if it falls in a service window
pub fn service_slot(time: NaiveTime) -> Option<&'static str> {
    SLOTS.iter().find_map(|(slot, (fh, fm), (th, tm))| {
        let from = NaiveTime::from_hms_opt(*fh, *fm, 0)?;
        let to = NaiveTime::from_hms_opt(*th, *tm, 0)?;
        (from <= time && time <= to).then_some(*slot)
    })
}
