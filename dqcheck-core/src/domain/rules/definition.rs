// dqcheck-core/src/domain/rules/definition.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

use super::operator::{Aggregation, ComparisonOperator, ComparisonType, Severity};
use super::pattern::PatternType;
use super::rule::{Rule, RuleId, RuleKind, RuleType};
use crate::domain::data::parse_numeric;
use crate::domain::error::DomainError;
use crate::domain::evaluation::expression::Expression;

/// A number as sent by a caller: JSON number or numeric text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Number(v)
    }
}

/// Flat wire form of a rule, used for create and as a partial update.
/// Every field is optional here; [`RuleKind::from_definition`] decides what
/// the rule_type actually requires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RuleDefinition {
    #[serde(alias = "rule_name", skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 100, message = "name must be 1 to 100 characters"))]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_value: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<Scalar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,
    #[serde(alias = "aggregation", alias = "kpi_type", skip_serializing_if = "Option::is_none")]
    pub operator_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_logic: Option<String>,
}

impl RuleDefinition {
    /// Fields present in `patch` win.
    pub fn merge(self, patch: RuleDefinition) -> RuleDefinition {
        RuleDefinition {
            name: patch.name.or(self.name),
            description: patch.description.or(self.description),
            rule_type: patch.rule_type.or(self.rule_type),
            severity: patch.severity.or(self.severity),
            created_by: patch.created_by.or(self.created_by),
            source_column: patch.source_column.or(self.source_column),
            target_column: patch.target_column.or(self.target_column),
            operator: patch.operator.or(self.operator),
            threshold_value: patch.threshold_value.or(self.threshold_value),
            min_value: patch.min_value.or(self.min_value),
            max_value: patch.max_value.or(self.max_value),
            pattern_type: patch.pattern_type.or(self.pattern_type),
            custom_pattern: patch.custom_pattern.or(self.custom_pattern),
            comparison_type: patch.comparison_type.or(self.comparison_type),
            case_sensitive: patch.case_sensitive.or(self.case_sensitive),
            operator_type: patch.operator_type.or(self.operator_type),
            rule_logic: patch.rule_logic.or(self.rule_logic),
        }
    }

    /// Builds a new active rule.
    pub fn into_rule(self, rule_id: RuleId, now: DateTime<Utc>) -> Result<Rule, DomainError> {
        self.validate()
            .map_err(|e| DomainError::InvalidRule(e.to_string()))?;

        let name = required_text(self.name.as_deref(), "name")?;
        let severity = match self.severity.as_deref() {
            Some(s) => Severity::from_str(s).map_err(DomainError::InvalidRule)?,
            None => Severity::default(),
        };
        let kind = RuleKind::from_definition(&self)?;

        Ok(Rule {
            rule_id,
            name,
            description: self.description.filter(|d| !d.trim().is_empty()),
            severity,
            is_active: true,
            created_by: self
                .created_by
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| "system".to_string()),
            created_at: now,
            updated_at: None,
            kind,
        })
    }
}

impl Rule {
    /// Flat view of the rule, the base a partial update is merged onto.
    pub fn to_definition(&self) -> RuleDefinition {
        let mut def = RuleDefinition {
            name: Some(self.name.clone()),
            description: self.description.clone(),
            rule_type: Some(self.rule_type().as_str().to_string()),
            severity: Some(self.severity.as_str().to_string()),
            created_by: Some(self.created_by.clone()),
            ..Default::default()
        };

        match &self.kind {
            RuleKind::Mandatory { source_column } => {
                def.source_column = Some(source_column.clone());
            }
            RuleKind::Threshold {
                source_column,
                operator,
                threshold_value,
            } => {
                def.source_column = Some(source_column.clone());
                def.operator = Some(operator.as_str().to_string());
                def.threshold_value = Some(Scalar::Number(*threshold_value));
            }
            RuleKind::CrossColumn {
                source_column,
                target_column,
                operator,
            } => {
                def.source_column = Some(source_column.clone());
                def.target_column = Some(target_column.clone());
                def.operator = Some(operator.as_str().to_string());
            }
            RuleKind::TextComparison {
                source_column,
                target_column,
                comparison_type,
                case_sensitive,
                threshold_value,
            } => {
                def.source_column = Some(source_column.clone());
                def.target_column = Some(target_column.clone());
                def.comparison_type = Some(comparison_type.as_str().to_string());
                def.case_sensitive = Some(*case_sensitive);
                def.threshold_value = threshold_value.map(Scalar::Number);
            }
            RuleKind::Pattern {
                source_column,
                pattern_type,
                custom_pattern,
            } => {
                def.source_column = Some(source_column.clone());
                def.pattern_type = Some(pattern_type.as_str().to_string());
                def.custom_pattern = custom_pattern.clone();
            }
            RuleKind::Range {
                source_column,
                min_value,
                max_value,
            } => {
                def.source_column = Some(source_column.clone());
                def.min_value = min_value.map(Scalar::Number);
                def.max_value = max_value.map(Scalar::Number);
            }
            RuleKind::Kpi {
                source_column,
                operator_type,
                operator,
                threshold_value,
            } => {
                def.source_column = source_column.clone();
                def.operator_type = Some(operator_type.as_str().to_string());
                def.operator = Some(operator.as_str().to_string());
                def.threshold_value = Some(Scalar::Number(*threshold_value));
            }
            RuleKind::Aggregate {
                source_column,
                operator_type,
                operator,
                threshold_value,
            } => {
                def.source_column = Some(source_column.clone());
                def.operator_type = Some(operator_type.as_str().to_string());
                def.operator = Some(operator.as_str().to_string());
                def.threshold_value = Some(Scalar::Number(*threshold_value));
            }
            RuleKind::Custom { rule_logic } => {
                def.rule_logic = Some(rule_logic.clone());
            }
        }
        def
    }
}

impl RuleKind {
    /// The one place where per-type requirements are enforced.
    pub fn from_definition(def: &RuleDefinition) -> Result<RuleKind, DomainError> {
        let rule_type = def
            .rule_type
            .as_deref()
            .ok_or_else(|| DomainError::InvalidRule("'rule_type' is required".into()))
            .and_then(|s| RuleType::from_str(s).map_err(DomainError::InvalidRule))?;

        let kind = match rule_type {
            RuleType::Mandatory => RuleKind::Mandatory {
                source_column: column(def, "source_column")?,
            },
            RuleType::Threshold => RuleKind::Threshold {
                source_column: column(def, "source_column")?,
                operator: operator(def)?,
                threshold_value: required_number(def.threshold_value.as_ref(), "threshold_value")?,
            },
            RuleType::CrossColumn => RuleKind::CrossColumn {
                source_column: column(def, "source_column")?,
                target_column: column(def, "target_column")?,
                operator: operator(def)?,
            },
            RuleType::TextComparison => {
                let comparison_type = match def.comparison_type.as_deref() {
                    Some(s) => ComparisonType::from_str(s).map_err(DomainError::InvalidRule)?,
                    None => ComparisonType::default(),
                };
                let threshold_value = match comparison_type {
                    ComparisonType::Fuzzy => {
                        let t = optional_number(def.threshold_value.as_ref(), "threshold_value")?;
                        if let Some(t) = t
                            && !(0.0..=1.0).contains(&t)
                        {
                            return Err(DomainError::InvalidRule(format!(
                                "fuzzy threshold_value must be between 0 and 1 (got {})",
                                t
                            )));
                        }
                        t
                    }
                    ComparisonType::Exact | ComparisonType::Substring => None,
                };
                RuleKind::TextComparison {
                    source_column: column(def, "source_column")?,
                    target_column: column(def, "target_column")?,
                    comparison_type,
                    case_sensitive: def.case_sensitive.unwrap_or(false),
                    threshold_value,
                }
            }
            RuleType::Pattern => {
                let pattern_type = def
                    .pattern_type
                    .as_deref()
                    .ok_or_else(|| DomainError::InvalidRule("pattern rule requires 'pattern_type'".into()))
                    .and_then(|s| PatternType::from_str(s).map_err(DomainError::InvalidRule))?;
                let custom_pattern = match pattern_type {
                    PatternType::CustomRegex => {
                        let pattern = required_text(def.custom_pattern.as_deref(), "custom_pattern")?;
                        pattern_type.compile(Some(&pattern))?;
                        Some(pattern)
                    }
                    _ => None,
                };
                RuleKind::Pattern {
                    source_column: column(def, "source_column")?,
                    pattern_type,
                    custom_pattern,
                }
            }
            RuleType::Range => {
                let min_value = optional_number(def.min_value.as_ref(), "min_value")?;
                let max_value = optional_number(def.max_value.as_ref(), "max_value")?;
                match (min_value, max_value) {
                    (None, None) => {
                        return Err(DomainError::InvalidRule(
                            "range rule requires 'min_value' and/or 'max_value'".into(),
                        ));
                    }
                    (Some(min), Some(max)) if min > max => {
                        return Err(DomainError::InvalidRule(format!(
                            "min_value ({}) is greater than max_value ({})",
                            min, max
                        )));
                    }
                    _ => {}
                }
                RuleKind::Range {
                    source_column: column(def, "source_column")?,
                    min_value,
                    max_value,
                }
            }
            RuleType::Kpi => {
                let operator_type = aggregation(def)?;
                let source_column = def
                    .source_column
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string);
                if source_column.is_none() && operator_type != Aggregation::Count {
                    return Err(DomainError::InvalidRule(format!(
                        "kpi '{}' requires 'source_column' (only count may omit it)",
                        operator_type
                    )));
                }
                RuleKind::Kpi {
                    source_column,
                    operator_type,
                    operator: operator(def)?,
                    threshold_value: required_number(def.threshold_value.as_ref(), "threshold_value")?,
                }
            }
            RuleType::Aggregate => RuleKind::Aggregate {
                source_column: column(def, "source_column")?,
                operator_type: aggregation(def)?,
                operator: operator(def)?,
                threshold_value: required_number(def.threshold_value.as_ref(), "threshold_value")?,
            },
            RuleType::Custom => {
                let rule_logic = required_text(def.rule_logic.as_deref(), "rule_logic")?;
                Expression::parse(&rule_logic)?;
                RuleKind::Custom { rule_logic }
            }
        };
        Ok(kind)
    }
}

fn required_text(value: Option<&str>, field: &str) -> Result<String, DomainError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| DomainError::InvalidRule(format!("'{}' is required", field)))
}

fn column(def: &RuleDefinition, field: &str) -> Result<String, DomainError> {
    let value = match field {
        "target_column" => def.target_column.as_deref(),
        _ => def.source_column.as_deref(),
    };
    required_text(value, field)
}

fn operator(def: &RuleDefinition) -> Result<ComparisonOperator, DomainError> {
    let raw = required_text(def.operator.as_deref(), "operator")?;
    ComparisonOperator::from_str(&raw).map_err(DomainError::InvalidRule)
}

fn aggregation(def: &RuleDefinition) -> Result<Aggregation, DomainError> {
    let raw = required_text(def.operator_type.as_deref(), "operator_type")?;
    Aggregation::from_str(&raw).map_err(DomainError::InvalidRule)
}

fn optional_number(value: Option<&Scalar>, field: &str) -> Result<Option<f64>, DomainError> {
    match value {
        None => Ok(None),
        Some(Scalar::Number(n)) if n.is_finite() => Ok(Some(*n)),
        Some(Scalar::Number(n)) => Err(DomainError::InvalidRule(format!(
            "'{}' must be a finite number (got {})",
            field, n
        ))),
        Some(Scalar::Text(t)) => parse_numeric(t).map(Some).ok_or_else(|| {
            DomainError::InvalidRule(format!("'{}' must be numeric (got '{}')", field, t))
        }),
    }
}

fn required_number(value: Option<&Scalar>, field: &str) -> Result<f64, DomainError> {
    optional_number(value, field)?
        .ok_or_else(|| DomainError::InvalidRule(format!("'{}' is required", field)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn def(yaml: &str) -> RuleDefinition {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_threshold_requires_operator_and_value() {
        let missing = def("name: t\nrule_type: threshold\nsource_column: amount\noperator: '>'");
        assert!(matches!(
            RuleKind::from_definition(&missing),
            Err(DomainError::InvalidRule(msg)) if msg.contains("threshold_value")
        ));

        let text = def("name: t\nrule_type: threshold\nsource_column: amount\noperator: '>'\nthreshold_value: lots");
        assert!(matches!(
            RuleKind::from_definition(&text),
            Err(DomainError::InvalidRule(msg)) if msg.contains("numeric")
        ));

        let ok = def("name: t\nrule_type: threshold\nsource_column: amount\noperator: '≥'\nthreshold_value: '1,000'");
        assert_eq!(
            RuleKind::from_definition(&ok).unwrap(),
            RuleKind::Threshold {
                source_column: "amount".into(),
                operator: ComparisonOperator::Ge,
                threshold_value: 1000.0,
            }
        );
    }

    #[test]
    fn test_unknown_rule_type_is_rejected() {
        let d = def("name: t\nrule_type: lookup\nsource_column: a");
        assert!(matches!(
            RuleKind::from_definition(&d),
            Err(DomainError::InvalidRule(msg)) if msg.contains("lookup")
        ));
    }

    #[test]
    fn test_pattern_rules() {
        let builtin = def("name: p\nrule_type: pattern\nsource_column: email\npattern_type: email\ncustom_pattern: ignored");
        assert_eq!(
            RuleKind::from_definition(&builtin).unwrap(),
            RuleKind::Pattern {
                source_column: "email".into(),
                pattern_type: PatternType::Email,
                custom_pattern: None,
            }
        );

        let bad_regex = def("name: p\nrule_type: pattern\nsource_column: code\npattern_type: custom_regex\ncustom_pattern: '([a-z'");
        assert!(RuleKind::from_definition(&bad_regex).is_err());

        let no_regex = def("name: p\nrule_type: pattern\nsource_column: code\npattern_type: custom_regex");
        assert!(RuleKind::from_definition(&no_regex).is_err());
    }

    #[test]
    fn test_range_bounds() {
        let open = def("name: r\nrule_type: range\nsource_column: score\nmin_value: 0");
        assert!(RuleKind::from_definition(&open).is_ok());

        let none = def("name: r\nrule_type: range\nsource_column: score");
        assert!(RuleKind::from_definition(&none).is_err());

        let inverted = def("name: r\nrule_type: range\nsource_column: score\nmin_value: 10\nmax_value: 1");
        assert!(RuleKind::from_definition(&inverted).is_err());
    }

    #[test]
    fn test_kpi_count_may_omit_column() {
        let count = def("name: k\nrule_type: kpi\noperator_type: count\noperator: '>='\nthreshold_value: 1");
        assert!(RuleKind::from_definition(&count).is_ok());

        let avg = def("name: k\nrule_type: kpi\noperator_type: avg\noperator: '<'\nthreshold_value: 50");
        assert!(RuleKind::from_definition(&avg).is_err());
    }

    #[test]
    fn test_custom_logic_is_checked() {
        let ok = def("name: c\nrule_type: custom\nrule_logic: amount > 0 AND status <> 'void'");
        assert!(RuleKind::from_definition(&ok).is_ok());

        let unsafe_logic = def("name: c\nrule_type: custom\nrule_logic: \"(SELECT 1) = 1\"");
        assert!(RuleKind::from_definition(&unsafe_logic).is_err());
    }

    #[test]
    fn test_text_comparison_drops_threshold_when_not_fuzzy() {
        let exact = def("name: x\nrule_type: text_comparison\nsource_column: a\ntarget_column: b\nthreshold_value: 0.9");
        assert_eq!(
            RuleKind::from_definition(&exact).unwrap(),
            RuleKind::TextComparison {
                source_column: "a".into(),
                target_column: "b".into(),
                comparison_type: ComparisonType::Exact,
                case_sensitive: false,
                threshold_value: None,
            }
        );

        let fuzzy = def("name: x\nrule_type: text_comparison\nsource_column: a\ntarget_column: b\ncomparison_type: fuzzy\nthreshold_value: 1.5");
        assert!(RuleKind::from_definition(&fuzzy).is_err());
    }

    #[test]
    fn test_into_rule_defaults() -> Result<()> {
        let rule = def("rule_name: Email required\nrule_type: mandatory\nsource_column: email")
            .into_rule(RuleId(1), Utc::now())?;
        assert_eq!(rule.name, "Email required");
        assert_eq!(rule.severity, Severity::Medium);
        assert_eq!(rule.created_by, "system");
        assert!(rule.is_active);

        let unnamed = def("rule_type: mandatory\nsource_column: email").into_rule(RuleId(2), Utc::now());
        assert!(unnamed.is_err());
        Ok(())
    }

    #[test]
    fn test_definition_round_trip_through_rule() -> Result<()> {
        let original = def("name: Score range\nrule_type: range\nsource_column: score\nmin_value: 0\nmax_value: 100\nseverity: high");
        let rule = original.into_rule(RuleId(4), Utc::now())?;
        let rebuilt = RuleKind::from_definition(&rule.to_definition())?;
        assert_eq!(rebuilt, rule.kind);
        Ok(())
    }
}
