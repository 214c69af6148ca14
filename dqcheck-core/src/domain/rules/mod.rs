// dqcheck-core/src/domain/rules/mod.rs

pub mod definition;
pub mod operator;
pub mod pattern;
pub mod rule;

// Re-exports
pub use definition::{RuleDefinition, Scalar};
pub use operator::{Aggregation, ComparisonOperator, ComparisonType, Severity};
pub use pattern::PatternType;
pub use rule::{Rule, RuleId, RuleKind, RuleType};
