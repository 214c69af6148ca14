// dqcheck-core/src/domain/evaluation/mod.rs

pub mod aggregate;
pub mod compiled;
pub mod evaluator;
pub mod expression;

pub use compiled::CompiledRule;
pub use evaluator::{RuleEvaluator, RuleTally};
pub use expression::{Expression, Scope};
