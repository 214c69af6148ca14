// dqcheck-core/src/domain/rules/operator.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tolerance used for numeric equality, so `0.1 + 0.2 = 0.3` holds.
pub const EQUALITY_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = "<", alias = "lt")]
    Lt,
    #[serde(rename = "<=", alias = "≤", alias = "lte")]
    Le,
    #[serde(rename = ">", alias = "gt")]
    Gt,
    #[serde(rename = ">=", alias = "≥", alias = "gte")]
    Ge,
    #[serde(rename = "=", alias = "==", alias = "eq")]
    Eq,
    #[serde(rename = "!=", alias = "<>", alias = "≠", alias = "ne")]
    Ne,
}

impl ComparisonOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "=",
            Self::Ne => "!=",
        }
    }

    pub fn compare(&self, left: f64, right: f64) -> bool {
        match self {
            Self::Lt => left < right,
            Self::Le => left <= right,
            Self::Gt => left > right,
            Self::Ge => left >= right,
            Self::Eq => (left - right).abs() < EQUALITY_TOLERANCE,
            Self::Ne => (left - right).abs() >= EQUALITY_TOLERANCE,
        }
    }

    /// Exact comparison for ordered non-numeric values (dates).
    pub fn compare_ord<T: PartialOrd>(&self, left: &T, right: &T) -> bool {
        match self {
            Self::Lt => left < right,
            Self::Le => left <= right,
            Self::Gt => left > right,
            Self::Ge => left >= right,
            Self::Eq => left == right,
            Self::Ne => left != right,
        }
    }
}

impl FromStr for ComparisonOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "<" | "lt" => Ok(Self::Lt),
            "<=" | "≤" | "lte" => Ok(Self::Le),
            ">" | "gt" => Ok(Self::Gt),
            ">=" | "≥" | "gte" => Ok(Self::Ge),
            "=" | "==" | "eq" => Ok(Self::Eq),
            "!=" | "<>" | "≠" | "ne" => Ok(Self::Ne),
            other => Err(format!(
                "unknown operator '{}'. Expected one of: <, <=, >, >=, =, !=",
                other
            )),
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column-wide functions used by kpi/aggregate rules and custom expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    #[serde(alias = "average", alias = "mean")]
    Avg,
    Count,
    Min,
    Max,
    Median,
    #[serde(alias = "std")]
    Stddev,
    NullCount,
    DistinctCount,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Count => "count",
            Self::Min => "min",
            Self::Max => "max",
            Self::Median => "median",
            Self::Stddev => "stddev",
            Self::NullCount => "null_count",
            Self::DistinctCount => "distinct_count",
        }
    }
}

impl FromStr for Aggregation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "avg" | "average" | "mean" => Ok(Self::Avg),
            "count" => Ok(Self::Count),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "median" => Ok(Self::Median),
            "stddev" | "std" => Ok(Self::Stddev),
            "null_count" => Ok(Self::NullCount),
            "distinct_count" => Ok(Self::DistinctCount),
            other => Err(format!("unknown aggregation '{}'", other)),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonType {
    #[default]
    Exact,
    Substring,
    Fuzzy,
}

impl ComparisonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Substring => "substring",
            Self::Fuzzy => "fuzzy",
        }
    }
}

impl FromStr for ComparisonType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "substring" => Ok(Self::Substring),
            "fuzzy" => Ok(Self::Fuzzy),
            other => Err(format!(
                "unknown comparison_type '{}'. Expected exact, substring or fuzzy",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Weight of a rule in the DQ score.
    pub fn weight(&self) -> f64 {
        match self {
            Self::Low => 1.0,
            Self::Medium => 2.0,
            Self::High => 3.0,
            Self::Critical => 4.0,
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!(
                "unknown severity '{}'. Expected low, medium, high or critical",
                other
            )),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_operator_aliases() -> Result<()> {
        assert_eq!("≤".parse::<ComparisonOperator>(), Ok(ComparisonOperator::Le));
        assert_eq!("<>".parse::<ComparisonOperator>(), Ok(ComparisonOperator::Ne));
        assert_eq!("GTE".parse::<ComparisonOperator>(), Ok(ComparisonOperator::Ge));
        assert!("~".parse::<ComparisonOperator>().is_err());

        let op: ComparisonOperator = serde_json::from_str("\"≥\"")?;
        assert_eq!(op, ComparisonOperator::Ge);
        assert_eq!(serde_json::to_string(&op)?, "\">=\"");
        Ok(())
    }

    #[test]
    fn test_numeric_equality_is_tolerant() {
        assert!(ComparisonOperator::Eq.compare(0.1 + 0.2, 0.3));
        assert!(!ComparisonOperator::Ne.compare(0.1 + 0.2, 0.3));
        assert!(ComparisonOperator::Lt.compare(1.0, 2.0));
    }

    #[test]
    fn test_severity_ordering_and_weights() {
        assert!(Severity::Low < Severity::Critical);
        assert!(Severity::Critical.weight() > Severity::Medium.weight());
        assert_eq!(Severity::default(), Severity::Medium);
    }

    #[test]
    fn test_aggregation_aliases() -> Result<()> {
        assert_eq!("average".parse::<Aggregation>(), Ok(Aggregation::Avg));
        let agg: Aggregation = serde_yaml::from_str("std")?;
        assert_eq!(agg, Aggregation::Stddev);
        Ok(())
    }
}
