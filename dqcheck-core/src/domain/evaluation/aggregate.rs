// dqcheck-core/src/domain/evaluation/aggregate.rs

use std::collections::HashSet;

use crate::domain::data::Value;
use crate::domain::rules::Aggregation;

/// Single-pass state for the aggregations of one column.
/// Only median and distinct_count retain values; the rest are running totals.
#[derive(Debug, Clone, Default)]
pub struct ColumnAccumulator {
    non_null: u64,
    nulls: u64,
    numeric: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    // Welford
    mean: f64,
    m2: f64,
    values: Option<Vec<f64>>,
    distinct: Option<HashSet<String>>,
}

impl ColumnAccumulator {
    pub fn new(aggregations: &[Aggregation]) -> Self {
        Self {
            values: aggregations
                .contains(&Aggregation::Median)
                .then(Vec::new),
            distinct: aggregations
                .contains(&Aggregation::DistinctCount)
                .then(HashSet::new),
            ..Default::default()
        }
    }

    pub fn observe(&mut self, value: &Value) {
        if value.is_null() {
            self.nulls += 1;
            return;
        }
        self.non_null += 1;

        if let Some(distinct) = self.distinct.as_mut() {
            distinct.insert(value.to_string());
        }

        let Some(x) = value.as_number() else {
            return;
        };
        self.numeric += 1;
        self.sum += x;
        self.min = Some(self.min.map_or(x, |m| m.min(x)));
        self.max = Some(self.max.map_or(x, |m| m.max(x)));

        let delta = x - self.mean;
        self.mean += delta / self.numeric as f64;
        self.m2 += delta * (x - self.mean);

        if let Some(values) = self.values.as_mut() {
            values.push(x);
        }
    }

    /// `None` when the aggregation is undefined for what was observed.
    pub fn value(&self, aggregation: Aggregation) -> Option<f64> {
        match aggregation {
            Aggregation::Count => Some(self.non_null as f64),
            Aggregation::NullCount => Some(self.nulls as f64),
            Aggregation::DistinctCount => self.distinct.as_ref().map(|d| d.len() as f64),
            Aggregation::Sum => Some(self.sum),
            Aggregation::Avg => (self.numeric > 0).then(|| self.sum / self.numeric as f64),
            Aggregation::Min => self.min,
            Aggregation::Max => self.max,
            Aggregation::Stddev => {
                (self.numeric > 1).then(|| (self.m2 / (self.numeric - 1) as f64).sqrt())
            }
            Aggregation::Median => self.values.as_ref().and_then(|v| median(v)),
        }
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
