//! Period report with year-over-year comparison

use crate::period::Period;
use crate::storage::WeeklySummaryRecord;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// One metric for the reported week next to the same week a year earlier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricLine {
    pub source: String,
    pub dimension: String,
    pub metric_name: String,
    pub value: f64,
    pub prior: Option<f64>,
    pub yoy_percent: Option<f64>,
}

/// Metrics grouped per source and dimension
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSection {
    pub source: String,
    pub dimension: String,
    pub metrics: Vec<MetricLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodReport {
    pub period: Period,
    pub prior_period: Period,
    pub sections: Vec<ReportSection>,
}

/// Percent change from `prior` to `current`; `None` without a usable prior
pub fn calc_yoy(current: f64, prior: f64) -> Option<f64> {
    if prior == 0.0 || !prior.is_finite() {
        return None;
    }
    Some((current - prior) / prior * 100.0)
}

impl PeriodReport {
    /// Pair `current` rows with `prior` rows on (source, dimension, metric)
    pub fn build(
        period: Period,
        current: &[WeeklySummaryRecord],
        prior: &[WeeklySummaryRecord],
    ) -> Self {
        let prior_values: HashMap<(&str, &str, &str), f64> = prior
            .iter()
            .map(|r| {
                (
                    (r.source.as_str(), r.dimension.as_str(), r.metric_name.as_str()),
                    r.metric_value,
                )
            })
            .collect();

        let mut grouped: BTreeMap<(&str, &str), Vec<MetricLine>> = BTreeMap::new();
        for r in current {
            let prior = prior_values
                .get(&(r.source.as_str(), r.dimension.as_str(), r.metric_name.as_str()))
                .copied();
            grouped
                .entry((r.source.as_str(), r.dimension.as_str()))
                .or_default()
                .push(MetricLine {
                    source: r.source.clone(),
                    dimension: r.dimension.clone(),
                    metric_name: r.metric_name.clone(),
                    value: r.metric_value,
                    prior,
                    yoy_percent: prior.and_then(|p| calc_yoy(r.metric_value, p)),
                });
        }

        let sections = grouped
            .into_iter()
            .map(|((source, dimension), metrics)| ReportSection {
                source: source.to_string(),
                dimension: dimension.to_string(),
                metrics,
            })
            .collect();

        Self {
            period,
            prior_period: period.year_ago(),
            sections,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn metric(&self, source: &str, dimension: &str, metric_name: &str) -> Option<&MetricLine> {
        self.sections
            .iter()
            .filter(|s| s.source == source && s.dimension == dimension)
            .flat_map(|s| s.metrics.iter())
            .find(|m| m.metric_name == metric_name)
    }
}
