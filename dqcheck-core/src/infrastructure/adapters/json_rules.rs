// dqcheck-core/src/infrastructure/adapters/json_rules.rs

use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::domain::rules::Rule;
use crate::error::DqError;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs::{atomic_write, read_optional};
use crate::ports::rule_repository::RuleRepository;

/// Rule set stored as a pretty JSON array, one file for the whole set.
#[derive(Debug, Clone)]
pub struct JsonRuleRepository {
    path: PathBuf,
}

impl JsonRuleRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<state_dir>/rules.json`
    pub fn in_state_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join("rules.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RuleRepository for JsonRuleRepository {
    #[instrument(skip(self), fields(path = ?self.path))]
    fn load(&self) -> Result<Vec<Rule>, DqError> {
        let Some(content) = read_optional(&self.path)? else {
            debug!("no rule file yet");
            return Ok(Vec::new());
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let rules: Vec<Rule> =
            serde_json::from_str(&content).map_err(InfrastructureError::JsonError)?;
        debug!(count = rules.len(), "rules loaded");
        Ok(rules)
    }

    fn save(&self, rules: &[Rule]) -> Result<(), DqError> {
        let json = serde_json::to_string_pretty(rules).map_err(InfrastructureError::JsonError)?;
        atomic_write(&self.path, json).map_err(|e| DqError::persistence(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::rules::{RuleDefinition, RuleId};
    use crate::error::ErrorKind;
    use anyhow::Result;
    use chrono::Utc;

    fn mandatory(id: u64, column: &str) -> Rule {
        let def: RuleDefinition = serde_json::from_value(serde_json::json!({
            "name": format!("{} required", column),
            "rule_type": "mandatory",
            "source_column": column,
        }))
        .unwrap();
        def.into_rule(RuleId(id), Utc::now()).unwrap()
    }

    #[test]
    fn test_round_trip_through_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = JsonRuleRepository::in_state_dir(&dir.path().join(".dqcheck"));
        assert!(repo.load()?.is_empty());

        let rules = vec![mandatory(1, "email"), mandatory(2, "name")];
        repo.save(&rules)?;
        assert_eq!(repo.load()?, rules);
        Ok(())
    }

    #[test]
    fn test_corrupt_file_is_reported() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = JsonRuleRepository::in_state_dir(dir.path());
        std::fs::write(repo.path(), "{not json")?;
        let err = repo.load().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        Ok(())
    }

    #[test]
    fn test_unwritable_location_is_persistence_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x")?;
        // parent is a regular file, so the directory cannot be created
        let repo = JsonRuleRepository::new(blocker.join("rules.json"));
        let err = repo.save(&[mandatory(1, "email")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        Ok(())
    }
}
