// dqcheck-core/src/domain/evaluation/evaluator.rs

use super::compiled::CompiledRule;
use crate::domain::configuration::EvaluationConfig;
use crate::domain::data::Row;
use crate::domain::error::DomainError;
use crate::domain::rules::{Rule, RuleId};
use crate::domain::violation::{Violation, ViolationType};

/// Counters kept per rule over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RuleTally {
    pub violations: u64,
    pub evaluation_errors: u64,
    /// Measured kpi/aggregate value, set by `finish`.
    pub aggregate_value: Option<f64>,
}

/// Runs a fixed set of rules over a stream of rows.
#[derive(Debug)]
pub struct RuleEvaluator {
    rules: Vec<CompiledRule>,
    tallies: Vec<RuleTally>,
    rows_seen: u64,
    header_rows: u64,
}

impl RuleEvaluator {
    /// Compiles `rules` against the column names of the source.
    pub fn new(
        rules: &[Rule],
        columns: &[String],
        options: &EvaluationConfig,
    ) -> Result<Self, DomainError> {
        let rules = rules
            .iter()
            .map(|r| CompiledRule::compile(r, columns, options))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            tallies: vec![RuleTally::default(); rules.len()],
            rules,
            rows_seen: 0,
            header_rows: 1,
        })
    }

    /// Header lines above the first data row, for `row_number`. Defaults to 1.
    pub fn with_header_rows(mut self, header_rows: u64) -> Self {
        self.header_rows = header_rows;
        self
    }

    pub fn rows_seen(&self) -> u64 {
        self.rows_seen
    }

    /// Violations for one row, in rule order.
    pub fn evaluate_row(&mut self, row: &Row) -> Vec<Violation> {
        self.rows_seen += 1;
        let mut out = Vec::new();
        for (compiled, tally) in self.rules.iter_mut().zip(self.tallies.iter_mut()) {
            if let Some(mut v) = compiled.observe(row) {
                v.renumber(self.header_rows);
                record(tally, &v);
                out.push(v);
            }
        }
        out
    }

    pub fn evaluate_batch(&mut self, rows: &[Row]) -> Vec<Violation> {
        rows.iter().flat_map(|r| self.evaluate_row(r)).collect()
    }

    /// Dataset-level violations, decided after the last row.
    pub fn finish(&mut self) -> Vec<Violation> {
        let mut out = Vec::new();
        for (compiled, tally) in self.rules.iter().zip(self.tallies.iter_mut()) {
            tally.aggregate_value = compiled.aggregate_value();
            if let Some(v) = compiled.finish() {
                record(tally, &v);
                out.push(v);
            }
        }
        out
    }

    /// (rule, dataset scope, tally) in rule order.
    pub fn outcomes(&self) -> impl Iterator<Item = (&Rule, bool, RuleTally)> {
        self.rules
            .iter()
            .zip(self.tallies.iter())
            .map(|(c, t)| (c.rule(), c.is_dataset_scope(), *t))
    }

    pub fn tally(&self, rule_id: RuleId) -> Option<RuleTally> {
        self.rules
            .iter()
            .position(|c| c.rule().rule_id == rule_id)
            .map(|i| self.tallies[i])
    }
}

fn record(tally: &mut RuleTally, violation: &Violation) {
    tally.violations += 1;
    if violation.violation_type == ViolationType::EvaluationError {
        tally.evaluation_errors += 1;
    }
}
