//! Small-group participation snapshot
//!
//! Dimension `all`. Counts only active (non-archived) groups of the
//! configured group type; coaches are the members of the named coaching
//! group.

use super::SummaryBatch;
use crate::config::GroupsSourceConfig;
use crate::period::Period;
use crate::sources::RawRecord;
use crate::storage::WeeklySummaryRecord;
use std::collections::{HashMap, HashSet};

pub const DIMENSION: &str = "all";

#[derive(Clone, Copy, PartialEq)]
enum Kind {
    SmallGroup,
    Coaching,
}

pub fn summarize(
    source: &str,
    period: &Period,
    records: &[RawRecord],
    rules: &GroupsSourceConfig,
) -> SummaryBatch {
    let mut batch = SummaryBatch::default();
    let mut kinds: HashMap<&str, Kind> = HashMap::new();

    for record in records {
        if let RawRecord::Group {
            id,
            name,
            group_type,
            archived,
        } = record
        {
            if *archived {
                continue;
            }
            let group_type = group_type.as_deref().unwrap_or_default();
            if group_type.eq_ignore_ascii_case(&rules.coaching_group_type)
                && name.trim().eq_ignore_ascii_case(&rules.coaching_group)
            {
                kinds.insert(id, Kind::Coaching);
            } else if group_type.eq_ignore_ascii_case(&rules.group_type) {
                kinds.insert(id, Kind::SmallGroup);
            }
        }
    }

    let mut members: HashSet<&str> = HashSet::new();
    let mut leaders: HashSet<&str> = HashSet::new();
    let mut coaches: HashSet<&str> = HashSet::new();

    for record in records {
        let RawRecord::Membership {
            group_id,
            person_id,
            role,
        } = record
        else {
            continue;
        };
        let Some(kind) = kinds.get(group_id.as_str()) else {
            continue;
        };
        let Some(person) = person_id.as_deref().filter(|p| !p.is_empty()) else {
            batch.skip(source, format!("membership in group {}", group_id), "no person");
            continue;
        };

        match kind {
            Kind::Coaching => {
                coaches.insert(person);
            }
            Kind::SmallGroup => {
                members.insert(person);
                if role.as_deref().map_or(false, |r| r.eq_ignore_ascii_case("leader")) {
                    leaders.insert(person);
                }
            }
        }
    }

    let groups = kinds.values().filter(|k| **k == Kind::SmallGroup).count();

    for (metric, value) in [
        ("number_of_groups", groups),
        ("total_groups_attendance", members.len()),
        ("group_leaders", leaders.len()),
        ("coaches", coaches.len()),
    ] {
        batch.records.push(WeeklySummaryRecord::new(
            source,
            period,
            DIMENSION,
            metric,
            value as f64,
        ));
    }

    batch
}
