// dqcheck-core/src/domain/violation.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::rules::{Rule, RuleId, RuleType, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(SessionId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    MissingValue,
    NullValue,
    NonNumeric,
    ThresholdBreach,
    CrossColumnMismatch,
    TextMismatch,
    PatternMismatch,
    OutOfRange,
    AggregateBreach,
    AggregateUndefined,
    CustomLogicFailed,
    EvaluationError,
}

impl ViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingValue => "missing_value",
            Self::NullValue => "null_value",
            Self::NonNumeric => "non_numeric",
            Self::ThresholdBreach => "threshold_breach",
            Self::CrossColumnMismatch => "cross_column_mismatch",
            Self::TextMismatch => "text_mismatch",
            Self::PatternMismatch => "pattern_mismatch",
            Self::OutOfRange => "out_of_range",
            Self::AggregateBreach => "aggregate_breach",
            Self::AggregateUndefined => "aggregate_undefined",
            Self::CustomLogicFailed => "custom_logic_failed",
            Self::EvaluationError => "evaluation_error",
        }
    }
}

impl FromStr for ViolationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown violation_type '{}'", s))
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1-based line of a data row in its file, header lines included.
pub fn row_number(row_index: u64, header_rows: u64) -> u64 {
    row_index + header_rows + 1
}

/// One failing (row, rule) pair. Dataset-level violations carry no row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub row_index: Option<u64>,
    pub row_number: Option<u64>,
    pub column_name: Option<String>,
    pub rule_id: RuleId,
    pub rule_name: String,
    pub rule_type: RuleType,
    pub violation_type: ViolationType,
    pub actual_value: Option<String>,
    pub expected_value: Option<String>,
    pub details: String,
    pub severity: Severity,
}

impl Violation {
    /// Starts a violation for `rule`, snapshotting its name and severity.
    pub fn for_rule(rule: &Rule, violation_type: ViolationType, details: impl Into<String>) -> Self {
        Self {
            row_index: None,
            row_number: None,
            column_name: None,
            rule_id: rule.rule_id,
            rule_name: rule.name.clone(),
            rule_type: rule.rule_type(),
            violation_type,
            actual_value: None,
            expected_value: None,
            details: details.into(),
            severity: rule.severity,
        }
    }

    /// Numbers the row assuming one header line; see [`Violation::renumber`].
    pub fn at_row(mut self, row_index: u64) -> Self {
        self.row_index = Some(row_index);
        self.row_number = Some(row_number(row_index, 1));
        self
    }

    /// Recomputes `row_number` for a source with `header_rows` header lines.
    pub fn renumber(&mut self, header_rows: u64) {
        self.row_number = self.row_index.map(|i| row_number(i, header_rows));
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column_name = Some(column.into());
        self
    }

    pub fn actual(mut self, value: impl fmt::Display) -> Self {
        self.actual_value = Some(value.to_string());
        self
    }

    pub fn expected(mut self, value: impl fmt::Display) -> Self {
        self.expected_value = Some(value.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    /// Normalises a request: page 0 reads as 1, page_size is clamped to
    /// `[1, max_page_size]`.
    pub fn resolve(page: u64, page_size: u64, max_page_size: u64, total: u64) -> Self {
        let page_size = page_size.clamp(1, max_page_size.max(1));
        Self {
            page: page.max(1),
            page_size,
            total,
            total_pages: total.div_ceil(page_size),
        }
    }

    /// Offset of the first item of the page.
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationPage {
    pub items: Vec<Violation>,
    pub pagination: Pagination,
}
