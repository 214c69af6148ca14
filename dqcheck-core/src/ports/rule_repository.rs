// dqcheck-core/src/ports/rule_repository.rs

use crate::domain::rules::Rule;
use crate::error::DqError;

/// Durable home of the rule set. The store keeps the working copy in memory
/// and hands the whole set over on every change.
pub trait RuleRepository: Send + Sync {
    fn load(&self) -> Result<Vec<Rule>, DqError>;

    /// Replaces the stored set. Must leave the previous set intact on failure.
    fn save(&self, rules: &[Rule]) -> Result<(), DqError>;
}
