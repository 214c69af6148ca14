// dqcheck-core/src/infrastructure/config/engine.rs

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::domain::configuration::EngineConfig;
use crate::infrastructure::error::InfrastructureError;

const CANDIDATES: [&str; 2] = ["dqcheck.yaml", "dqcheck_conf.yaml"];

// --- LOADER ---

/// Reads the engine config of `project_dir`. No file means defaults;
/// a file that does not parse or validate is an error.
#[instrument(skip(project_dir))]
pub fn load_engine_config(project_dir: &Path) -> Result<EngineConfig, InfrastructureError> {
    let mut config = match find_config(project_dir) {
        Some(path) => {
            info!(path = ?path, "Loading engine config");
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                EngineConfig::default()
            } else {
                serde_yaml::from_str(&content)?
            }
        }
        None => {
            info!("No config file found, using defaults");
            EngineConfig::default()
        }
    };

    // Layering: VAR=... dqcheck run
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

    config
        .validate()
        .map_err(|e| InfrastructureError::ConfigError(e.to_string()))?;
    Ok(config)
}

fn find_config(root: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| root.join(name))
        .find(|p| p.is_file())
}

/// `DQCHECK_STATE_DIR`, `DQCHECK_BATCH_SIZE`, `DQCHECK_MAX_PAGE_SIZE`.
pub fn apply_env_overrides<F>(config: &mut EngineConfig, lookup: F) -> Result<(), InfrastructureError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("DQCHECK_STATE_DIR") {
        info!(old = %config.state_dir, new = %val, "Overriding state dir via ENV");
        config.state_dir = val;
    }
    if let Some(val) = lookup("DQCHECK_BATCH_SIZE") {
        config.evaluation.batch_size = parse_env("DQCHECK_BATCH_SIZE", &val)?;
    }
    if let Some(val) = lookup("DQCHECK_MAX_PAGE_SIZE") {
        config.pagination.max_page_size = parse_env("DQCHECK_MAX_PAGE_SIZE", &val)?;
        if config.pagination.default_page_size > config.pagination.max_page_size {
            warn!(
                default = config.pagination.default_page_size,
                "default_page_size lowered to the new max_page_size"
            );
            config.pagination.default_page_size = config.pagination.max_page_size;
        }
    }
    Ok(())
}

fn parse_env(key: &str, raw: &str) -> Result<u64, InfrastructureError> {
    raw.trim().parse().map_err(|_| {
        InfrastructureError::ConfigError(format!("{} must be a positive integer, got '{}'", key, raw))
    })
}
