//! Email campaign performance per audience
//!
//! Mailchimp reports rates as fractions; summaries store percentages
//! (open rate to 2 places, click rate to 3). Audiences that sent nothing in
//! the period still get a row set with zeros.

use super::{round_to, SummaryBatch};
use crate::period::Period;
use crate::sources::RawRecord;
use crate::storage::WeeklySummaryRecord;
use std::collections::BTreeMap;

#[derive(Default)]
struct Rates {
    opens: Vec<f64>,
    clicks: Vec<f64>,
}

pub fn summarize(source: &str, period: &Period, records: &[RawRecord]) -> SummaryBatch {
    let mut batch = SummaryBatch::default();
    let mut audiences: BTreeMap<String, Rates> = BTreeMap::new();

    for record in records {
        match record {
            RawRecord::EmailAudience { audience, .. } => {
                audiences.entry(audience.clone()).or_default();
            }
            RawRecord::CampaignReport {
                audience,
                campaign_id,
                open_rate,
                click_rate,
            } => {
                let (Some(open), Some(click)) = (valid_rate(*open_rate), valid_rate(*click_rate))
                else {
                    batch.skip(source, format!("campaign {}", campaign_id), "missing or invalid rate");
                    continue;
                };
                let rates = audiences.entry(audience.clone()).or_default();
                rates.opens.push(open);
                rates.clicks.push(click);
            }
            _ => {}
        }
    }

    for (audience, rates) in audiences {
        let count = rates.opens.len();
        let (open, click) = if count == 0 {
            (0.0, 0.0)
        } else {
            (
                round_to(mean(&rates.opens) * 100.0, 2),
                round_to(mean(&rates.clicks) * 100.0, 3),
            )
        };

        for (metric, value) in [
            ("email_count", count as f64),
            ("avg_open_rate", open),
            ("avg_click_rate", click),
        ] {
            batch
                .records
                .push(WeeklySummaryRecord::new(source, period, &audience, metric, value));
        }
    }

    batch
}

fn valid_rate(rate: Option<f64>) -> Option<f64> {
    rate.filter(|r| r.is_finite() && (0.0..=1.0).contains(r))
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn period() -> Period {
        Period::from_week_start(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
    }

    fn audience(name: &str) -> RawRecord {
        RawRecord::EmailAudience {
            audience: name.to_string(),
            list_id: format!("{}-id", name),
        }
    }

    fn report(audience: &str, id: &str, open: Option<f64>, click: Option<f64>) -> RawRecord {
        RawRecord::CampaignReport {
            audience: audience.to_string(),
            campaign_id: id.to_string(),
            open_rate: open,
            click_rate: click,
        }
    }

    #[test]
    fn test_averages_as_percent() {
        let records = vec![
            audience("Weekly"),
            report("Weekly", "c1", Some(0.5), Some(0.01)),
            report("Weekly", "c2", Some(0.25), Some(0.02)),
        ];
        let batch = summarize("mailchimp", &period(), &records);

        assert_eq!(batch.metric("Weekly", "email_count"), Some(2.0));
        assert_eq!(batch.metric("Weekly", "avg_open_rate"), Some(37.5));
        assert_eq!(batch.metric("Weekly", "avg_click_rate"), Some(1.5));
    }

    #[test]
    fn test_quiet_audience_gets_zeros() {
        let batch = summarize("mailchimp", &period(), &[audience("Parents")]);
        assert_eq!(batch.records.len(), 3);
        assert_eq!(batch.metric("Parents", "email_count"), Some(0.0));
        assert_eq!(batch.metric("Parents", "avg_open_rate"), Some(0.0));
    }

    #[test]
    fn test_bad_report_is_skipped() {
        let records = vec![
            audience("Weekly"),
            report("Weekly", "c1", Some(0.4), Some(0.02)),
            report("Weekly", "c2", None, Some(0.02)),
            report("Weekly", "c3", Some(4.0), Some(0.02)),
        ];
        let batch = summarize("mailchimp", &period(), &records);

        assert_eq!(batch.skipped.len(), 2);
        assert_eq!(batch.metric("Weekly", "email_count"), Some(1.0));
        assert_eq!(batch.metric("Weekly", "avg_open_rate"), Some(40.0));
    }
}
