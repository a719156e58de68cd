//! Livestreams published during one week
//!
//! Each stream gets its own dimension (the video id) with `views`,
//! `duration_secs` and `published_at` (Unix seconds). Dimension `all` carries
//! `livestream_count` and `total_views`.
//!
//! A finished video counts as a livestream only when it runs at least
//! `min_duration_secs`; videos still live or upcoming always count.

use super::SummaryBatch;
use crate::period::Period;
use crate::sources::RawRecord;
use crate::storage::WeeklySummaryRecord;
use chrono::{DateTime, FixedOffset};

pub const ALL: &str = "all";

pub fn summarize(
    source: &str,
    period: &Period,
    records: &[RawRecord],
    offset: FixedOffset,
    min_duration_secs: u64,
) -> SummaryBatch {
    let mut batch = SummaryBatch::default();
    let mut count = 0.0;
    let mut total_views = 0.0;

    for record in records {
        let RawRecord::Livestream {
            video_id,
            published_at,
            duration,
            views,
            broadcast,
            ..
        } = record
        else {
            continue;
        };
        let label = format!("video {}", video_id);

        let Some(published) = published_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        else {
            batch.skip(source, label, "missing or invalid published_at");
            continue;
        };
        if !period.contains(published.with_timezone(&offset).date_naive()) {
            continue;
        }

        let on_air = broadcast.as_deref().map_or(false, |b| b != "none");
        let seconds = match duration.as_deref().map(parse_iso_duration) {
            Some(Some(secs)) => secs,
            _ if on_air => 0,
            _ => {
                batch.skip(source, label, "missing or invalid duration");
                continue;
            }
        };
        if !on_air && seconds < min_duration_secs {
            continue;
        }

        let Some(views) = views.filter(|v| v.is_finite() && *v >= 0.0) else {
            batch.skip(source, label, "missing or negative view count");
            continue;
        };

        count += 1.0;
        total_views += views;
        for (metric, value) in [
            ("views", views),
            ("duration_secs", seconds as f64),
            ("published_at", published.timestamp() as f64),
        ] {
            batch
                .records
                .push(WeeklySummaryRecord::new(source, period, video_id.as_str(), metric, value));
        }
    }

    batch
        .records
        .push(WeeklySummaryRecord::new(source, period, ALL, "livestream_count", count));
    batch
        .records
        .push(WeeklySummaryRecord::new(source, period, ALL, "total_views", total_views));

    batch
}

/// Seconds in an ISO 8601 duration such as `PT1H2M3S` or `P1DT2H`
pub(crate) fn parse_iso_duration(raw: &str) -> Option<u64> {
    let rest = raw.trim().strip_prefix('P')?;
    if rest.is_empty() {
        return None;
    }
    let (date, time) = rest.split_once('T').unwrap_or((rest, ""));

    let mut total = 0u64;
    for (part, units) in [
        (date, &[('W', 604_800), ('D', 86_400)][..]),
        (time, &[('H', 3_600), ('M', 60), ('S', 1)][..]),
    ] {
        let mut digits = String::new();
        for c in part.chars() {
            if c.is_ascii_digit() {
                digits.push(c);
                continue;
            }
            let (_, scale) = units.iter().find(|(unit, _)| *unit == c)?;
            let n: u64 = digits.parse().ok()?;
            total = total.checked_add(n.checked_mul(*scale)?)?;
            digits.clear();
        }
        if !digits.is_empty() {
            return None;
        }
    }

    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::offset_from_hours;
    use chrono::NaiveDate;

    fn period() -> Period {
        Period::from_week_start(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    fn stream(id: &str, published: &str, duration: &str, views: f64, broadcast: &str) -> RawRecord {
        RawRecord::Livestream {
            video_id: id.to_string(),
            title: Some(format!("Sunday {}", id)),
            published_at: Some(published.to_string()),
            duration: Some(duration.to_string()),
            views: Some(views),
            broadcast: Some(broadcast.to_string()),
        }
    }

    #[test]
    fn test_parse_iso_duration() {
        assert_eq!(parse_iso_duration("PT1H2M3S"), Some(3723));
        assert_eq!(parse_iso_duration("PT45M"), Some(2700));
        assert_eq!(parse_iso_duration("P1DT1S"), Some(86_401));
        assert_eq!(parse_iso_duration("P0D"), Some(0));
        assert_eq!(parse_iso_duration("PT"), Some(0));
        assert_eq!(parse_iso_duration("P"), None);
        assert_eq!(parse_iso_duration("1H"), None);
        assert_eq!(parse_iso_duration("PT1.5S"), None);
        assert_eq!(parse_iso_duration("PT12"), None);
    }

    #[test]
    fn test_per_stream_metrics() {
        let records = vec![
            stream("a1", "2024-01-07T16:00:00Z", "PT1H10M", 340.0, "none"),
            stream("b2", "2024-01-03T01:30:00Z", "PT35M", 60.0, "none"),
        ];
        let batch = summarize("livestreams", &period(), &records, offset_from_hours(-6), 1800);

        assert_eq!(batch.metric("a1", "views"), Some(340.0));
        assert_eq!(batch.metric("a1", "duration_secs"), Some(4200.0));
        assert_eq!(batch.metric("a1", "published_at"), Some(1_704_643_200.0));
        assert_eq!(batch.metric("b2", "duration_secs"), Some(2100.0));
        assert_eq!(batch.metric(ALL, "livestream_count"), Some(2.0));
        assert_eq!(batch.metric(ALL, "total_views"), Some(400.0));
        assert!(batch.skipped.is_empty());
    }

    #[test]
    fn test_short_uploads_and_other_weeks_are_ignored() {
        let records = vec![
            stream("clip", "2024-01-04T12:00:00Z", "PT4M", 900.0, "none"),
            // Sunday evening local, Monday in UTC
            stream("late", "2024-01-08T03:00:00Z", "PT1H", 50.0, "none"),
            stream("next", "2024-01-08T18:00:00Z", "PT1H", 70.0, "none"),
            stream("now", "2024-01-07T15:00:00Z", "P0D", 12.0, "live"),
        ];
        let batch = summarize("livestreams", &period(), &records, offset_from_hours(-6), 1800);

        assert_eq!(batch.metric("clip", "views"), None);
        assert_eq!(batch.metric("next", "views"), None);
        assert_eq!(batch.metric("late", "views"), Some(50.0));
        assert_eq!(batch.metric("now", "duration_secs"), Some(0.0));
        assert_eq!(batch.metric(ALL, "livestream_count"), Some(2.0));
        assert!(batch.skipped.is_empty());
    }

    #[test]
    fn test_empty_week_reports_zero() {
        let batch = summarize("livestreams", &period(), &[], offset_from_hours(0), 1800);
        assert_eq!(batch.metric(ALL, "livestream_count"), Some(0.0));
        assert_eq!(batch.metric(ALL, "total_views"), Some(0.0));
    }

    #[test]
    fn test_malformed_streams_are_skipped() {
        let records = vec![
            stream("ok", "2024-01-07T16:00:00Z", "PT1H", 10.0, "none"),
            stream("bad-duration", "2024-01-07T16:00:00Z", "an hour", 10.0, "none"),
            RawRecord::Livestream {
                video_id: "no-views".into(),
                title: None,
                published_at: Some("2024-01-07T16:00:00Z".into()),
                duration: Some("PT1H".into()),
                views: None,
                broadcast: None,
            },
            RawRecord::Livestream {
                video_id: "no-date".into(),
                title: None,
                published_at: None,
                duration: Some("PT1H".into()),
                views: Some(3.0),
                broadcast: None,
            },
        ];
        let batch = summarize("livestreams", &period(), &records, offset_from_hours(0), 1800);

        assert_eq!(batch.skipped.len(), 3);
        assert_eq!(batch.metric(ALL, "livestream_count"), Some(1.0));
    }
}
