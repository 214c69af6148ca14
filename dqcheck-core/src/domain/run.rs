// dqcheck-core/src/domain/run.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::evaluation::RuleTally;
use crate::domain::rules::{Rule, RuleId, RuleKind, RuleType, Severity};
use crate::domain::violation::{SessionId, ViolationPage};

const MAX_RECOMMENDATIONS: usize = 10;
const LARGE_DATASET_ROWS: u64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Assessment {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Assessment {
    pub fn from_score(score: f64) -> Self {
        if score >= 95.0 {
            Self::Excellent
        } else if score >= 80.0 {
            Self::Good
        } else if score >= 60.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

impl fmt::Display for Assessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Excellent => "EXCELLENT",
            Self::Good => "GOOD",
            Self::Fair => "FAIR",
            Self::Poor => "POOR",
        };
        f.write_str(s)
    }
}

/// How one rule fared over a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub rule_type: RuleType,
    pub severity: Severity,
    /// Rows for row-scope rules, 1 for dataset-scope rules.
    pub checks: u64,
    pub violations: u64,
    pub evaluation_errors: u64,
    pub compliance: f64,
    pub passed: bool,
    /// Measured value of a kpi/aggregate rule, recorded pass or fail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_value: Option<f64>,
}

impl RuleOutcome {
    pub fn new(rule: &Rule, dataset_scope: bool, tally: RuleTally, total_rows: u64) -> Self {
        let checks = if dataset_scope { 1 } else { total_rows };
        Self {
            rule_id: rule.rule_id,
            rule_name: rule.name.clone(),
            rule_type: rule.rule_type(),
            severity: rule.severity,
            checks,
            violations: tally.violations,
            evaluation_errors: tally.evaluation_errors,
            compliance: compliance(tally.violations, checks),
            passed: tally.violations == 0,
            aggregate_value: tally.aggregate_value,
        }
    }
}

/// `max(0, 1 - violations / checks)`; with no checks, all or nothing.
pub fn compliance(violations: u64, checks: u64) -> f64 {
    if checks == 0 {
        return if violations == 0 { 1.0 } else { 0.0 };
    }
    (1.0 - violations as f64 / checks as f64).max(0.0)
}

/// Severity-weighted mean compliance on a 0-100 scale.
pub fn dq_score(outcomes: &[RuleOutcome]) -> f64 {
    let total_weight: f64 = outcomes.iter().map(|o| o.severity.weight()).sum();
    if total_weight == 0.0 {
        return 100.0;
    }
    let weighted: f64 = outcomes
        .iter()
        .map(|o| o.severity.weight() * o.compliance)
        .sum();
    (100.0 * weighted / total_weight).clamp(0.0, 100.0)
}

/// Identity of a run, fixed when it starts.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub session_id: SessionId,
    pub source: String,
    pub rule_ids: Vec<RuleId>,
    pub skipped_rule_ids: Vec<RuleId>,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn complete(
        self,
        status: RunStatus,
        total_rows: u64,
        evaluated: &[(&Rule, RuleOutcome)],
        finished_at: DateTime<Utc>,
    ) -> RunSummary {
        let outcomes: Vec<RuleOutcome> = evaluated.iter().map(|(_, o)| o.clone()).collect();
        let dq_score = dq_score(&outcomes);

        RunSummary {
            session_id: self.session_id,
            status,
            source: self.source,
            rule_ids: self.rule_ids,
            skipped_rule_ids: self.skipped_rule_ids,
            started_at: self.started_at,
            finished_at,
            total_records_checked: total_rows,
            total_violations: outcomes.iter().map(|o| o.violations).sum(),
            evaluation_errors: outcomes.iter().map(|o| o.evaluation_errors).sum(),
            rules_passed: outcomes.iter().filter(|o| o.passed).count() as u64,
            rules_failed: outcomes.iter().filter(|o| !o.passed).count() as u64,
            dq_score,
            assessment: Assessment::from_score(dq_score),
            recommendations: recommendations(dq_score, evaluated, total_rows),
            outcomes,
        }
    }
}

/// The run record. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub session_id: SessionId,
    pub status: RunStatus,
    pub source: String,
    pub rule_ids: Vec<RuleId>,
    pub skipped_rule_ids: Vec<RuleId>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_records_checked: u64,
    pub total_violations: u64,
    pub evaluation_errors: u64,
    pub rules_passed: u64,
    pub rules_failed: u64,
    pub dq_score: f64,
    pub assessment: Assessment,
    pub outcomes: Vec<RuleOutcome>,
    pub recommendations: Vec<String>,
}

impl RunSummary {
    /// Measured kpi/aggregate values of this run, in rule order.
    pub fn kpi_records(&self) -> Vec<KpiRecord> {
        self.outcomes
            .iter()
            .filter_map(|o| {
                o.aggregate_value.map(|value| KpiRecord {
                    session_id: self.session_id,
                    rule_id: o.rule_id,
                    rule_name: o.rule_name.clone(),
                    rule_type: o.rule_type,
                    value,
                    passed: o.passed,
                    recorded_at: self.finished_at,
                })
            })
            .collect()
    }
}

/// One point of a kpi's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiRecord {
    pub session_id: SessionId,
    pub rule_id: RuleId,
    pub rule_name: String,
    pub rule_type: RuleType,
    pub value: f64,
    pub passed: bool,
    pub recorded_at: DateTime<Utc>,
}

/// What `execute` hands back to a caller: the summary and the first page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub session_id: SessionId,
    pub dq_score: f64,
    pub summary: RunSummary,
    pub violations: ViolationPage,
}

fn recommendations(score: f64, evaluated: &[(&Rule, RuleOutcome)], total_rows: u64) -> Vec<String> {
    let mut out = vec![
        match Assessment::from_score(score) {
            Assessment::Excellent => "Data quality is excellent. Maintain current rule standards.",
            Assessment::Good => "Data quality is good. Minor rule adjustments may improve score.",
            Assessment::Fair => "Data quality is fair. Review and fix major rule violations.",
            Assessment::Poor => "Data quality is poor. Immediate attention needed for rule violations.",
        }
        .to_string(),
    ];

    for (rule, outcome) in evaluated.iter().filter(|(_, o)| o.violations > 0) {
        out.push(rule_hint(rule, outcome.violations));
    }

    let severe: u64 = evaluated
        .iter()
        .filter(|(_, o)| o.severity >= Severity::High)
        .map(|(_, o)| o.violations)
        .sum();
    if severe > 0 {
        out.push(format!(
            "Prioritize fixing {} high/critical severity violations",
            severe
        ));
    }

    if total_rows > LARGE_DATASET_ROWS {
        out.push(
            "For large datasets, consider batch processing or sampling for rule validation"
                .to_string(),
        );
    }

    let mut unique: Vec<String> = Vec::with_capacity(out.len());
    for rec in out {
        if !unique.contains(&rec) {
            unique.push(rec);
        }
    }
    unique.truncate(MAX_RECOMMENDATIONS);
    unique
}

fn rule_hint(rule: &Rule, count: u64) -> String {
    match &rule.kind {
        RuleKind::Mandatory { source_column } => format!(
            "Fix {} missing values in mandatory column '{}'",
            count, source_column
        ),
        RuleKind::Threshold {
            source_column,
            operator,
            threshold_value,
        } => format!(
            "Review {} values in '{}' violating {} {}",
            count, source_column, operator, threshold_value
        ),
        RuleKind::CrossColumn {
            source_column,
            target_column,
            ..
        }
        | RuleKind::TextComparison {
            source_column,
            target_column,
            ..
        } => format!(
            "Check {} mismatches between columns: {}, {}",
            count, source_column, target_column
        ),
        RuleKind::Pattern {
            source_column,
            pattern_type,
            ..
        } => format!(
            "Fix {} values in '{}' not matching {} pattern",
            count,
            source_column,
            pattern_type.as_str()
        ),
        RuleKind::Range { source_column, .. } => format!(
            "Review {} out-of-range values in '{}'",
            count, source_column
        ),
        RuleKind::Kpi { .. } | RuleKind::Aggregate { .. } => format!(
            "Investigate the '{}' indicator, it is outside its target",
            rule.name
        ),
        RuleKind::Custom { .. } => format!(
            "Review {} records failing custom rule '{}'",
            count, rule.name
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn outcome(severity: Severity, violations: u64, checks: u64) -> RuleOutcome {
        RuleOutcome {
            rule_id: RuleId(1),
            rule_name: "r".into(),
            rule_type: RuleType::Mandatory,
            severity,
            checks,
            violations,
            evaluation_errors: 0,
            compliance: compliance(violations, checks),
            passed: violations == 0,
            aggregate_value: None,
        }
    }

    #[test]
    fn test_kpi_records_keep_passing_values() {
        let now = Utc::now();
        let mut kpi = outcome(Severity::Medium, 0, 1);
        kpi.rule_id = RuleId(4);
        kpi.rule_type = RuleType::Kpi;
        kpi.aggregate_value = Some(42.5);
        let summary = RunContext {
            session_id: SessionId::new(),
            source: "csv:orders.csv".into(),
            rule_ids: vec![RuleId(1), RuleId(4)],
            skipped_rule_ids: vec![],
            started_at: now,
        }
        .complete(RunStatus::Completed, 10, &[], now);
        let summary = RunSummary {
            outcomes: vec![outcome(Severity::High, 2, 10), kpi],
            ..summary
        };

        let records = summary.kpi_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rule_id, RuleId(4));
        assert_eq!(records[0].value, 42.5);
        assert!(records[0].passed);
        assert_eq!(records[0].recorded_at, now);
    }

    #[test]
    fn test_score_is_severity_weighted() {
        // critical rule fully compliant, low rule at 50%
        let outcomes = vec![
            outcome(Severity::Critical, 0, 10),
            outcome(Severity::Low, 5, 10),
        ];
        let score = dq_score(&outcomes);
        assert!((score - 90.0).abs() < 1e-9);
        assert_eq!(Assessment::from_score(score), Assessment::Good);
    }

    #[test]
    fn test_score_bounds() {
        assert_eq!(dq_score(&[outcome(Severity::High, 50, 10)]), 0.0);
        assert_eq!(dq_score(&[outcome(Severity::High, 0, 0)]), 100.0);
        assert_eq!(dq_score(&[outcome(Severity::High, 1, 0)]), 0.0);
        assert_eq!(dq_score(&[]), 100.0);
    }

    #[test]
    fn test_more_violations_never_raise_the_score() {
        let mut previous = 100.0;
        for v in 0..=12 {
            let s = dq_score(&[outcome(Severity::Medium, v, 10), outcome(Severity::Low, 1, 10)]);
            assert!(s <= previous);
            previous = s;
        }
    }

    #[test]
    fn test_assessment_thresholds() {
        assert_eq!(Assessment::from_score(95.0), Assessment::Excellent);
        assert_eq!(Assessment::from_score(94.99), Assessment::Good);
        assert_eq!(Assessment::from_score(60.0), Assessment::Fair);
        assert_eq!(Assessment::from_score(10.0), Assessment::Poor);
        assert_eq!(serde_json::to_value(Assessment::Poor).unwrap(), "POOR");
    }
}
