// dqcheck-core/src/domain/evaluation/compiled.rs

use regex::Regex;
use std::collections::HashMap;

use super::aggregate::ColumnAccumulator;
use super::expression::{Expression, Scope};
use crate::domain::configuration::EvaluationConfig;
use crate::domain::data::{Row, Value, resolve_column};
use crate::domain::error::DomainError;
use crate::domain::rules::{
    Aggregation, ComparisonOperator, ComparisonType, PatternType, Rule, RuleKind,
};
use crate::domain::violation::{Violation, ViolationType};

/// Tolerance applied to fuzzy similarity so a threshold met exactly passes.
const SIMILARITY_EPSILON: f64 = 1e-9;

#[derive(Debug)]
enum Check {
    Mandatory {
        column: String,
    },
    Threshold {
        column: String,
        operator: ComparisonOperator,
        threshold: f64,
    },
    CrossColumn {
        source: String,
        target: String,
        operator: ComparisonOperator,
    },
    Text {
        source: String,
        target: String,
        comparison: ComparisonType,
        case_sensitive: bool,
        threshold: f64,
    },
    Pattern {
        column: String,
        regex: Regex,
        label: &'static str,
    },
    Range {
        column: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    Aggregate {
        column: Option<String>,
        aggregation: Aggregation,
        operator: ComparisonOperator,
        threshold: f64,
        acc: ColumnAccumulator,
        /// kpi `count` is the row count whether or not a column is named.
        counts_rows: bool,
    },
    CustomRow(Expression),
    CustomDataset {
        expr: Expression,
        accs: HashMap<String, ColumnAccumulator>,
    },
    /// A referenced column does not exist in the source.
    Unavailable {
        missing: Vec<String>,
    },
}

/// A rule bound to one source schema, with its regexes, expressions and
/// accumulators ready. Built once per run.
#[derive(Debug)]
pub struct CompiledRule {
    rule: Rule,
    check: Check,
    null_is_violation: bool,
    rows: u64,
}

impl CompiledRule {
    pub fn compile(
        rule: &Rule,
        columns: &[String],
        options: &EvaluationConfig,
    ) -> Result<Self, DomainError> {
        let mut missing = Vec::new();
        let mut col = |name: &str| -> String {
            match resolve_column(columns, name) {
                Some(i) => columns[i].clone(),
                None => {
                    missing.push(name.to_string());
                    name.to_string()
                }
            }
        };

        let check = match &rule.kind {
            RuleKind::Mandatory { source_column } => Check::Mandatory {
                column: col(source_column),
            },
            RuleKind::Threshold {
                source_column,
                operator,
                threshold_value,
            } => Check::Threshold {
                column: col(source_column),
                operator: *operator,
                threshold: *threshold_value,
            },
            RuleKind::CrossColumn {
                source_column,
                target_column,
                operator,
            } => Check::CrossColumn {
                source: col(source_column),
                target: col(target_column),
                operator: *operator,
            },
            RuleKind::TextComparison {
                source_column,
                target_column,
                comparison_type,
                case_sensitive,
                threshold_value,
            } => Check::Text {
                source: col(source_column),
                target: col(target_column),
                comparison: *comparison_type,
                case_sensitive: *case_sensitive,
                threshold: threshold_value.unwrap_or(options.fuzzy_threshold),
            },
            RuleKind::Pattern {
                source_column,
                pattern_type,
                custom_pattern,
            } => Check::Pattern {
                column: col(source_column),
                regex: pattern_type.compile(custom_pattern.as_deref())?,
                label: pattern_label(*pattern_type),
            },
            RuleKind::Range {
                source_column,
                min_value,
                max_value,
            } => Check::Range {
                column: col(source_column),
                min: *min_value,
                max: *max_value,
            },
            RuleKind::Kpi {
                source_column,
                operator_type,
                operator,
                threshold_value,
            } => Check::Aggregate {
                column: source_column.as_deref().map(&mut col),
                aggregation: *operator_type,
                operator: *operator,
                threshold: *threshold_value,
                acc: ColumnAccumulator::new(&[*operator_type]),
                counts_rows: *operator_type == Aggregation::Count,
            },
            RuleKind::Aggregate {
                source_column,
                operator_type,
                operator,
                threshold_value,
            } => Check::Aggregate {
                column: Some(col(source_column)),
                aggregation: *operator_type,
                operator: *operator,
                threshold: *threshold_value,
                acc: ColumnAccumulator::new(&[*operator_type]),
                counts_rows: false,
            },
            RuleKind::Custom { rule_logic } => {
                let expr = Expression::parse(rule_logic)?;
                for c in expr.columns() {
                    col(&c);
                }
                match expr.scope() {
                    Scope::Row => Check::CustomRow(expr),
                    Scope::Dataset => {
                        let mut per_column: HashMap<String, Vec<Aggregation>> = HashMap::new();
                        for (agg, column) in expr.aggregates() {
                            if let Some(c) = column {
                                per_column.entry(c).or_default().push(agg);
                            }
                        }
                        let accs = per_column
                            .into_iter()
                            .map(|(c, aggs)| (c, ColumnAccumulator::new(&aggs)))
                            .collect();
                        Check::CustomDataset { expr, accs }
                    }
                }
            }
        };

        let check = if missing.is_empty() {
            check
        } else {
            Check::Unavailable { missing }
        };

        Ok(Self {
            rule: rule.clone(),
            check,
            null_is_violation: options.null_is_violation,
            rows: 0,
        })
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    /// Dataset-scope rules produce at most one violation, after the scan.
    pub fn is_dataset_scope(&self) -> bool {
        matches!(
            self.check,
            Check::Aggregate { .. } | Check::CustomDataset { .. } | Check::Unavailable { .. }
        )
    }

    /// Feeds one row. Row-scope rules return their violation, if any;
    /// dataset-scope rules only accumulate.
    pub fn observe(&mut self, row: &Row) -> Option<Violation> {
        self.rows += 1;
        let rule = &self.rule;
        let nulls_fail = self.null_is_violation;

        match &mut self.check {
            Check::Mandatory { column } => {
                let value = row.value(column);
                value.is_blank().then(|| {
                    Violation::for_rule(rule, ViolationType::MissingValue, "required value is missing")
                        .at_row(row.index())
                        .column(column.as_str())
                        .actual(value)
                        .expected("non-empty value")
                })
            }
            Check::Threshold {
                column,
                operator,
                threshold,
            } => {
                let value = row.value(column);
                if value.is_null() {
                    return null_violation(rule, row, column, nulls_fail);
                }
                let expected = format!("{} {}", operator, threshold);
                let base = |vt, details: String| {
                    Violation::for_rule(rule, vt, details)
                        .at_row(row.index())
                        .column(column.as_str())
                        .actual(value)
                        .expected(&expected)
                };
                match value.as_number() {
                    None => Some(base(ViolationType::NonNumeric, "non-numeric value".into())),
                    Some(n) if operator.compare(n, *threshold) => None,
                    Some(n) => Some(base(
                        ViolationType::ThresholdBreach,
                        format!("{} is not {} {}", n, operator, threshold),
                    )),
                }
            }
            Check::CrossColumn {
                source,
                target,
                operator,
            } => {
                let (left, right) = (row.value(source), row.value(target));
                if left.is_null() || right.is_null() {
                    let column = if left.is_null() { &*source } else { &*target };
                    return null_violation(rule, row, column, nulls_fail);
                }
                let violation = |vt, details: String| {
                    Some(
                        Violation::for_rule(rule, vt, details)
                            .at_row(row.index())
                            .column(source.as_str())
                            .actual(format!("{}={}, {}={}", source, left, target, right))
                            .expected(format!("{} {} {}", source, operator, target)),
                    )
                };
                match cross_compare(*operator, left, right) {
                    Some(true) => None,
                    Some(false) => violation(
                        ViolationType::CrossColumnMismatch,
                        format!("{} {} {} does not hold", left, operator, right),
                    ),
                    None => violation(
                        ViolationType::NonNumeric,
                        "values are neither numbers nor dates".into(),
                    ),
                }
            }
            Check::Text {
                source,
                target,
                comparison,
                case_sensitive,
                threshold,
            } => {
                let (left, right) = (row.value(source), row.value(target));
                if left.is_null() || right.is_null() {
                    let column = if left.is_null() { &*source } else { &*target };
                    return null_violation(rule, row, column, nulls_fail);
                }
                let (a, b) = normalise_pair(left, right, *case_sensitive);
                let (passed, details, expected) = match comparison {
                    ComparisonType::Exact => (a == b, "values differ".to_string(), "identical text".to_string()),
                    ComparisonType::Substring => (
                        substring_match(&a, &b),
                        "neither value contains the other".to_string(),
                        "one value contained in the other".to_string(),
                    ),
                    ComparisonType::Fuzzy => {
                        let score = strsim::normalized_levenshtein(&a, &b);
                        (
                            score + SIMILARITY_EPSILON >= *threshold,
                            format!("similarity {:.4} below {}", score, threshold),
                            format!("similarity >= {}", threshold),
                        )
                    }
                };
                (!passed).then(|| {
                    Violation::for_rule(rule, ViolationType::TextMismatch, details)
                        .at_row(row.index())
                        .column(source.as_str())
                        .actual(format!("'{}' vs '{}'", left, right))
                        .expected(expected)
                })
            }
            Check::Pattern {
                column,
                regex,
                label,
            } => {
                let value = row.value(column);
                if value.is_null() {
                    return null_violation(rule, row, column, nulls_fail);
                }
                let text = value.to_string();
                (!regex.is_match(text.trim())).then(|| {
                    Violation::for_rule(
                        rule,
                        ViolationType::PatternMismatch,
                        format!("value does not match the {} pattern", label),
                    )
                    .at_row(row.index())
                    .column(column.as_str())
                    .actual(&text)
                    .expected(*label)
                })
            }
            Check::Range { column, min, max } => {
                let value = row.value(column);
                if value.is_null() {
                    return null_violation(rule, row, column, nulls_fail);
                }
                let expected = describe_bounds(*min, *max);
                let base = |vt, details: String| {
                    Violation::for_rule(rule, vt, details)
                        .at_row(row.index())
                        .column(column.as_str())
                        .actual(value)
                        .expected(&expected)
                };
                match value.as_number() {
                    None => Some(base(ViolationType::NonNumeric, "non-numeric value".into())),
                    Some(n) if min.is_none_or(|lo| n >= lo) && max.is_none_or(|hi| n <= hi) => {
                        None
                    }
                    Some(n) => Some(base(
                        ViolationType::OutOfRange,
                        format!("{} is outside {}", n, expected),
                    )),
                }
            }
            Check::CustomRow(expr) => match expr.evaluate_row(row) {
                Ok(Value::Bool(true)) => None,
                Ok(Value::Bool(false)) => Some(
                    Violation::for_rule(
                        rule,
                        ViolationType::CustomLogicFailed,
                        format!("rule_logic evaluated to false: {}", expr.source()),
                    )
                    .at_row(row.index())
                    .actual(referenced_values(expr, row))
                    .expected(expr.source()),
                ),
                Ok(Value::Null) => null_violation(rule, row, "", nulls_fail).map(|mut v| {
                    v.column_name = None;
                    v.details = format!("rule_logic evaluated to NULL: {}", expr.source());
                    v
                }),
                Ok(other) => Some(evaluation_error(
                    rule,
                    Some(row),
                    format!("rule_logic returned '{}', not a boolean", other),
                )),
                Err(message) => Some(evaluation_error(rule, Some(row), message)),
            },
            Check::Aggregate { column, acc, .. } => {
                if let Some(column) = column {
                    acc.observe(row.value(column));
                }
                None
            }
            Check::CustomDataset { accs, .. } => {
                for (column, acc) in accs.iter_mut() {
                    acc.observe(row.value(column));
                }
                None
            }
            Check::Unavailable { .. } => None,
        }
    }

    /// The measured value of a kpi/aggregate rule, pass or fail. `None` for
    /// other rules and for an undefined aggregate.
    pub fn aggregate_value(&self) -> Option<f64> {
        match &self.check {
            Check::Aggregate {
                column,
                aggregation,
                acc,
                counts_rows,
                ..
            } => match column {
                Some(_) if !*counts_rows => acc.value(*aggregation),
                _ => Some(self.rows as f64),
            },
            _ => None,
        }
    }

    /// Decides dataset-scope rules once every row has been observed.
    pub fn finish(&self) -> Option<Violation> {
        let rule = &self.rule;
        match &self.check {
            Check::Aggregate {
                column,
                aggregation,
                operator,
                threshold,
                counts_rows,
                ..
            } => {
                let label = match column {
                    Some(c) if !*counts_rows => format!("{}({})", aggregation, c),
                    _ => format!("{}(*)", aggregation),
                };
                let expected = format!("{} {} {}", label, operator, threshold);
                match self.aggregate_value() {
                    None => Some(
                        Violation::for_rule(rule, ViolationType::AggregateUndefined, "aggregate undefined")
                            .actual("NULL")
                            .expected(expected)
                            .with_column(column.as_deref()),
                    ),
                    Some(v) if operator.compare(v, *threshold) => None,
                    Some(v) => Some(
                        Violation::for_rule(
                            rule,
                            ViolationType::AggregateBreach,
                            format!("{} = {} is not {} {}", label, v, operator, threshold),
                        )
                        .actual(v)
                        .expected(expected)
                        .with_column(column.as_deref()),
                    ),
                }
            }
            Check::CustomDataset { expr, accs } => {
                let rows = self.rows;
                let lookup = |agg: Aggregation, column: Option<&str>| match column {
                    None => Some(rows as f64),
                    Some(c) => accs.get(c).and_then(|acc| acc.value(agg)),
                };
                match expr.evaluate_dataset(&lookup) {
                    Ok(Value::Bool(true)) => None,
                    Ok(Value::Bool(false)) => Some(
                        Violation::for_rule(
                            rule,
                            ViolationType::CustomLogicFailed,
                            format!("rule_logic evaluated to false: {}", expr.source()),
                        )
                        .expected(expr.source()),
                    ),
                    Ok(Value::Null) => Some(
                        Violation::for_rule(rule, ViolationType::AggregateUndefined, "aggregate undefined")
                            .actual("NULL")
                            .expected(expr.source()),
                    ),
                    Ok(other) => Some(evaluation_error(
                        rule,
                        None,
                        format!("rule_logic returned '{}', not a boolean", other),
                    )),
                    Err(message) => Some(evaluation_error(rule, None, message)),
                }
            }
            Check::Unavailable { missing } => Some(evaluation_error(
                rule,
                None,
                format!("column(s) not found in source: {}", missing.join(", ")),
            )),
            _ => None,
        }
    }
}

impl Violation {
    fn with_column(mut self, column: Option<&str>) -> Self {
        self.column_name = column.map(str::to_string);
        self
    }
}

fn null_violation(rule: &Rule, row: &Row, column: &str, nulls_fail: bool) -> Option<Violation> {
    nulls_fail.then(|| {
        Violation::for_rule(rule, ViolationType::NullValue, "value is NULL")
            .at_row(row.index())
            .column(column)
            .actual(Value::Null)
    })
}

fn evaluation_error(rule: &Rule, row: Option<&Row>, message: String) -> Violation {
    let err = DomainError::RuleExecution {
        rule: rule.name.clone(),
        message,
    };
    tracing::debug!(rule_id = %rule.rule_id, row = ?row.map(Row::index), "{}", err);
    let v = Violation::for_rule(rule, ViolationType::EvaluationError, err.to_string());
    match row {
        Some(r) => v.at_row(r.index()),
        None => v,
    }
}

fn pattern_label(pattern: PatternType) -> &'static str {
    match pattern {
        PatternType::CustomRegex => "custom regex",
        other => other.as_str(),
    }
}

/// Dates first, then numbers. `=`/`!=` fall back to text equality.
fn cross_compare(operator: ComparisonOperator, left: &Value, right: &Value) -> Option<bool> {
    if let (Some(a), Some(b)) = (left.as_datetime(), right.as_datetime()) {
        return Some(operator.compare_ord(&a, &b));
    }
    if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
        return Some(operator.compare(a, b));
    }
    match operator {
        ComparisonOperator::Eq | ComparisonOperator::Ne => {
            Some(operator.compare_ord(&left.to_string(), &right.to_string()))
        }
        _ => None,
    }
}

fn normalise_pair(left: &Value, right: &Value, case_sensitive: bool) -> (String, String) {
    let (a, b) = (left.to_string(), right.to_string());
    let (a, b) = (a.trim(), b.trim());
    if case_sensitive {
        (a.to_string(), b.to_string())
    } else {
        (a.to_lowercase(), b.to_lowercase())
    }
}

fn substring_match(a: &str, b: &str) -> bool {
    if a.contains(b) || b.contains(a) {
        return true;
    }
    let squash = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
    let (a, b) = (squash(a), squash(b));
    a.contains(&b) || b.contains(&a)
}

fn describe_bounds(min: Option<f64>, max: Option<f64>) -> String {
    match (min, max) {
        (Some(lo), Some(hi)) => format!("[{}, {}]", lo, hi),
        (Some(lo), None) => format!(">= {}", lo),
        (None, Some(hi)) => format!("<= {}", hi),
        (None, None) => "any value".to_string(),
    }
}

fn referenced_values(expr: &Expression, row: &Row) -> String {
    expr.columns()
        .iter()
        .map(|c| format!("{}={}", c, row.value(c)))
        .collect::<Vec<_>>()
        .join(", ")
}
