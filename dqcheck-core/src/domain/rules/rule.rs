// dqcheck-core/src/domain/rules/rule.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::operator::{Aggregation, ComparisonOperator, ComparisonType, Severity};
use super::pattern::PatternType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub u64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RuleId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(RuleId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Mandatory,
    Threshold,
    CrossColumn,
    TextComparison,
    Pattern,
    Range,
    Kpi,
    Aggregate,
    Custom,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mandatory => "mandatory",
            Self::Threshold => "threshold",
            Self::CrossColumn => "cross_column",
            Self::TextComparison => "text_comparison",
            Self::Pattern => "pattern",
            Self::Range => "range",
            Self::Kpi => "kpi",
            Self::Aggregate => "aggregate",
            Self::Custom => "custom",
        }
    }
}

impl FromStr for RuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mandatory" => Ok(Self::Mandatory),
            "threshold" => Ok(Self::Threshold),
            "cross_column" => Ok(Self::CrossColumn),
            "text_comparison" => Ok(Self::TextComparison),
            "pattern" => Ok(Self::Pattern),
            "range" => Ok(Self::Range),
            "kpi" => Ok(Self::Kpi),
            "aggregate" => Ok(Self::Aggregate),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unrecognized rule_type '{}'", other)),
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific payload of a rule. Only the fields of the variant exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule_type", rename_all = "snake_case")]
pub enum RuleKind {
    Mandatory {
        source_column: String,
    },
    Threshold {
        source_column: String,
        operator: ComparisonOperator,
        threshold_value: f64,
    },
    CrossColumn {
        source_column: String,
        target_column: String,
        operator: ComparisonOperator,
    },
    TextComparison {
        source_column: String,
        target_column: String,
        comparison_type: ComparisonType,
        #[serde(default)]
        case_sensitive: bool,
        /// Similarity threshold, fuzzy comparisons only.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        threshold_value: Option<f64>,
    },
    Pattern {
        source_column: String,
        pattern_type: PatternType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        custom_pattern: Option<String>,
    },
    Range {
        source_column: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_value: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_value: Option<f64>,
    },
    Kpi {
        /// Without a column, `count` is the dataset row count.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_column: Option<String>,
        operator_type: Aggregation,
        operator: ComparisonOperator,
        threshold_value: f64,
    },
    Aggregate {
        source_column: String,
        operator_type: Aggregation,
        operator: ComparisonOperator,
        threshold_value: f64,
    },
    Custom {
        rule_logic: String,
    },
}

impl RuleKind {
    pub fn rule_type(&self) -> RuleType {
        match self {
            Self::Mandatory { .. } => RuleType::Mandatory,
            Self::Threshold { .. } => RuleType::Threshold,
            Self::CrossColumn { .. } => RuleType::CrossColumn,
            Self::TextComparison { .. } => RuleType::TextComparison,
            Self::Pattern { .. } => RuleType::Pattern,
            Self::Range { .. } => RuleType::Range,
            Self::Kpi { .. } => RuleType::Kpi,
            Self::Aggregate { .. } => RuleType::Aggregate,
            Self::Custom { .. } => RuleType::Custom,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: RuleId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub kind: RuleKind,
}

impl Rule {
    pub fn rule_type(&self) -> RuleType {
        self.kind.rule_type()
    }
}
