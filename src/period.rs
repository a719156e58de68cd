//! Weekly Periods
//!
//! A period is one Monday..Sunday window (both ends inclusive). Every
//! summary row is keyed by the Monday of the week it covers.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A weekly reporting window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    /// First day of the window (inclusive)
    pub start: NaiveDate,
    /// Last day of the window (inclusive)
    pub end: NaiveDate,
}

/// Errors building a period from operator input
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PeriodError {
    #[error("Invalid period: start {start} is after end {end}")]
    Inverted { start: NaiveDate, end: NaiveDate },

    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Provide only one of week_start or week_end")]
    Ambiguous,

    #[error("week_start must be a Monday, {date} is a {weekday}")]
    NotMonday { date: NaiveDate, weekday: Weekday },

    #[error("week_end must be a Sunday, {date} is a {weekday}")]
    NotSunday { date: NaiveDate, weekday: Weekday },

    #[error("Backfill must cover between 1 and {max} weeks, got {got}")]
    BackfillRange { got: u32, max: u32 },
}

/// Upper bound on weeks processed by a single backfill request
pub const MAX_BACKFILL_WEEKS: u32 = 104;

impl Period {
    /// Create a period from explicit bounds
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PeriodError> {
        if start > end {
            return Err(PeriodError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    /// The Monday..Sunday week containing `date`
    pub fn week_containing(date: NaiveDate) -> Self {
        let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
        Self {
            start: monday,
            end: monday + Duration::days(6),
        }
    }

    /// Seven-day window starting on `start`
    pub fn from_week_start(start: NaiveDate) -> Self {
        Self {
            start,
            end: start + Duration::days(6),
        }
    }

    /// Seven-day window ending on `end`
    pub fn from_week_end(end: NaiveDate) -> Self {
        Self {
            start: end - Duration::days(6),
            end,
        }
    }

    /// Last fully completed Monday..Sunday week as seen in the given offset.
    ///
    /// On a Sunday the current week is still in progress, so the week
    /// before it is returned.
    pub fn previous_complete(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let today = now.with_timezone(&offset).date_naive();
        let last_sunday =
            today - Duration::days(today.weekday().num_days_from_monday() as i64 + 1);
        Self::from_week_end(last_sunday)
    }

    /// Resolve operator input into a period.
    ///
    /// With neither bound given, the previous complete week is used. An
    /// explicit bound must fall on the matching week boundary so every
    /// stored week stays keyed by its Monday.
    pub fn resolve(
        week_start: Option<&str>,
        week_end: Option<&str>,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Result<Self, PeriodError> {
        match (week_start, week_end) {
            (Some(_), Some(_)) => Err(PeriodError::Ambiguous),
            (Some(start), None) => {
                let date = parse_date(start)?;
                match date.weekday() {
                    Weekday::Mon => Ok(Self::from_week_start(date)),
                    weekday => Err(PeriodError::NotMonday { date, weekday }),
                }
            }
            (None, Some(end)) => {
                let date = parse_date(end)?;
                match date.weekday() {
                    Weekday::Sun => Ok(Self::from_week_end(date)),
                    weekday => Err(PeriodError::NotSunday { date, weekday }),
                }
            }
            (None, None) => Ok(Self::previous_complete(now, offset)),
        }
    }

    /// `weeks` consecutive periods ending with `self`, oldest first
    pub fn backfill(&self, weeks: u32) -> Result<Vec<Period>, PeriodError> {
        if weeks == 0 || weeks > MAX_BACKFILL_WEEKS {
            return Err(PeriodError::BackfillRange {
                got: weeks,
                max: MAX_BACKFILL_WEEKS,
            });
        }
        Ok((0..weeks as i64)
            .rev()
            .map(|i| self.shift_weeks(-i))
            .collect())
    }

    /// Move the window by a whole number of weeks
    pub fn shift_weeks(&self, weeks: i64) -> Self {
        let delta = Duration::weeks(weeks);
        Self {
            start: self.start + delta,
            end: self.end + delta,
        }
    }

    /// The week before this one
    pub fn previous(&self) -> Self {
        self.shift_weeks(-1)
    }

    /// Same week one year earlier (52 weeks back, so weekdays line up)
    pub fn year_ago(&self) -> Self {
        self.shift_weeks(-52)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of days covered, inclusive
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Whole-day UTC lower bound, e.g. `2024-01-01T00:00:00Z`
    pub fn start_rfc3339(&self) -> String {
        format!("{}T00:00:00Z", self.start.format("%Y-%m-%d"))
    }

    /// Whole-day UTC upper bound, e.g. `2024-01-07T23:59:59Z`
    pub fn end_rfc3339(&self) -> String {
        format!("{}T23:59:59Z", self.end.format("%Y-%m-%d"))
    }

    /// Lower bound in milliseconds since the epoch (UTC midnight)
    pub fn start_millis(&self) -> i64 {
        self.start
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or_default()
    }

    /// Exclusive upper bound in milliseconds (midnight after `end`)
    pub fn end_millis_exclusive(&self) -> i64 {
        (self.end + Duration::days(1))
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or_default()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(raw: &str) -> Result<NaiveDate, PeriodError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| PeriodError::InvalidDate(raw.to_string()))
}

/// Build a fixed offset from whole hours east of UTC (negative = west)
pub fn offset_from_hours(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours.clamp(-23, 23) * 3600).unwrap_or(Utc.fix())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_week_containing_normalizes_to_monday() {
        // 2024-01-03 is a Wednesday
        let p = Period::week_containing(date("2024-01-03"));
        assert_eq!(p.start, date("2024-01-01"));
        assert_eq!(p.end, date("2024-01-07"));
        assert_eq!(p.num_days(), 7);
    }

    #[test]
    fn test_previous_complete_midweek() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 15, 0, 0).unwrap();
        let p = Period::previous_complete(now, offset_from_hours(0));
        assert_eq!(p.start, date("2024-01-01"));
        assert_eq!(p.end, date("2024-01-07"));
    }

    #[test]
    fn test_previous_complete_on_sunday_skips_current_week() {
        let now = Utc.with_ymd_and_hms(2024, 1, 14, 12, 0, 0).unwrap();
        let p = Period::previous_complete(now, offset_from_hours(0));
        assert_eq!(p.end, date("2024-01-07"));
    }

    #[test]
    fn test_previous_complete_respects_offset() {
        // Monday 03:00 UTC is still Sunday evening at UTC-6
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 3, 0, 0).unwrap();
        let local = Period::previous_complete(now, offset_from_hours(-6));
        assert_eq!(local.end, date("2024-01-07"));

        let utc = Period::previous_complete(now, offset_from_hours(0));
        assert_eq!(utc.end, date("2024-01-14"));
    }

    #[test]
    fn test_new_rejects_inverted() {
        let err = Period::new(date("2024-01-07"), date("2024-01-01")).unwrap_err();
        assert!(matches!(err, PeriodError::Inverted { .. }));
        assert!(Period::new(date("2024-01-01"), date("2024-01-01")).is_ok());
    }

    #[test]
    fn test_resolve() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 15, 0, 0).unwrap();
        let offset = offset_from_hours(0);

        let p = Period::resolve(Some("2024-02-05"), None, now, offset).unwrap();
        assert_eq!(p.end, date("2024-02-11"));

        let p = Period::resolve(None, Some("2024-02-11"), now, offset).unwrap();
        assert_eq!(p.start, date("2024-02-05"));

        let p = Period::resolve(None, None, now, offset).unwrap();
        assert_eq!(p.start, date("2024-01-01"));

        assert_eq!(
            Period::resolve(Some("2024-02-05"), Some("2024-02-11"), now, offset),
            Err(PeriodError::Ambiguous)
        );
        assert!(matches!(
            Period::resolve(Some("02/05/2024"), None, now, offset),
            Err(PeriodError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_resolve_rejects_misaligned_bounds() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 15, 0, 0).unwrap();
        let offset = offset_from_hours(0);

        // 2024-01-03 is a Wednesday
        assert_eq!(
            Period::resolve(Some("2024-01-03"), None, now, offset),
            Err(PeriodError::NotMonday {
                date: date("2024-01-03"),
                weekday: Weekday::Wed,
            })
        );
        assert_eq!(
            Period::resolve(None, Some("2024-01-03"), now, offset),
            Err(PeriodError::NotSunday {
                date: date("2024-01-03"),
                weekday: Weekday::Wed,
            })
        );

        let p = Period::resolve(None, Some("2024-01-07"), now, offset).unwrap();
        assert_eq!(p.start.weekday(), Weekday::Mon);
        assert_eq!(p.start, date("2024-01-01"));
    }

    #[test]
    fn test_backfill_oldest_first() {
        let last = Period::from_week_start(date("2024-01-15"));
        let weeks = last.backfill(3).unwrap();
        assert_eq!(weeks.len(), 3);
        assert_eq!(weeks[0].start, date("2024-01-01"));
        assert_eq!(weeks[2], last);

        assert!(last.backfill(0).is_err());
        assert!(last.backfill(MAX_BACKFILL_WEEKS + 1).is_err());
    }

    #[test]
    fn test_year_ago_keeps_weekday() {
        let p = Period::from_week_start(date("2024-01-01"));
        let prior = p.year_ago();
        assert_eq!(prior.start.weekday(), p.start.weekday());
        assert_eq!(prior.start, date("2023-01-02"));
    }

    #[test]
    fn test_bounds() {
        let p = Period::from_week_start(date("2024-01-01"));
        assert_eq!(p.start_rfc3339(), "2024-01-01T00:00:00Z");
        assert_eq!(p.end_rfc3339(), "2024-01-07T23:59:59Z");
        assert_eq!(p.end_millis_exclusive() - p.start_millis(), 7 * 86_400_000);
        assert!(p.contains(date("2024-01-07")));
        assert!(!p.contains(date("2024-01-08")));
        assert_eq!(p.to_string(), "2024-01-01..2024-01-07");
    }
}
