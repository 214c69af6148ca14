// dqcheck-core/src/domain/configuration.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Engine settings, read from `dqcheck.yaml`. Every section is optional.
#[derive(Debug, Deserialize, Serialize, Clone, Validate, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    #[validate(length(min = 1, message = "state_dir cannot be empty"))]
    pub state_dir: String,

    #[validate(nested)]
    pub evaluation: EvaluationConfig,

    #[validate(nested)]
    pub pagination: PaginationConfig,

    pub database: DatabaseDefaults,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_dir: ".dqcheck".to_string(),
            evaluation: EvaluationConfig::default(),
            pagination: PaginationConfig::default(),
            database: DatabaseDefaults::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate, PartialEq)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Rows fetched from the source per round trip.
    #[validate(range(min = 1, max = 1_000_000))]
    pub batch_size: u64,

    /// When set, a NULL seen by a non-mandatory rule is a violation instead of a skip.
    pub null_is_violation: bool,

    /// Similarity used by fuzzy text rules that do not set their own.
    #[validate(range(min = 0.0, max = 1.0))]
    pub fuzzy_threshold: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            null_is_violation: false,
            fuzzy_threshold: 0.8,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Validate, PartialEq)]
#[serde(default)]
#[validate(schema(function = "validate_page_sizes"))]
pub struct PaginationConfig {
    #[validate(range(min = 1))]
    pub default_page_size: u64,
    #[validate(range(min = 1, max = 10_000))]
    pub max_page_size: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 500,
        }
    }
}

fn validate_page_sizes(p: &PaginationConfig) -> Result<(), validator::ValidationError> {
    if p.default_page_size > p.max_page_size {
        let mut err = validator::ValidationError::new("page_size");
        err.message = Some("default_page_size cannot exceed max_page_size".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct DatabaseDefaults {
    pub postgres_port: u16,
    pub mysql_port: u16,
}

impl Default for DatabaseDefaults {
    fn default() -> Self {
        Self {
            postgres_port: 5432,
            mysql_port: 3306,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg: EngineConfig = serde_yaml::from_str("evaluation:\n  batch_size: 10\n").unwrap();
        assert_eq!(cfg.evaluation.batch_size, 10);
        assert_eq!(cfg.evaluation.fuzzy_threshold, 0.8);
        assert_eq!(cfg.pagination.max_page_size, 500);
        assert_eq!(cfg.state_dir, ".dqcheck");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let mut cfg = EngineConfig::default();
        cfg.evaluation.batch_size = 0;
        cfg.evaluation.fuzzy_threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.pagination.default_page_size = 900;
        assert!(cfg.validate().is_err());
    }
}
