// dqcheck/src/commands/mod.rs
//
// Wiring shared by every command: config, state dir and the core services.

pub mod render;
pub mod rules;
pub mod run;
pub mod violations;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dqcheck_core::application::{RuleStore, RunOrchestrator};
use dqcheck_core::DqError;
use dqcheck_core::domain::configuration::EngineConfig;
use dqcheck_core::domain::error::DomainError;
use dqcheck_core::domain::violation::SessionId;
use dqcheck_core::infrastructure::config::load_engine_config;
use dqcheck_core::infrastructure::{DuckDbSourceOpener, DuckDbViolationStore, JsonRuleRepository};

pub struct AppContext {
    pub rules: Arc<RuleStore>,
    pub orchestrator: RunOrchestrator,
}

impl AppContext {
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config = load_engine_config(project_dir).with_context(|| {
            format!("Failed to load engine configuration from {:?}", project_dir)
        })?;
        let state_dir = state_dir(project_dir, &config);

        let repository = Arc::new(JsonRuleRepository::in_state_dir(&state_dir));
        let rules = Arc::new(
            RuleStore::open(repository)
                .with_context(|| format!("Failed to load rules from {:?}", state_dir))?,
        );

        let db_path = state_dir.join("violations.duckdb");
        let store = DuckDbViolationStore::open(&db_path, config.pagination.max_page_size)
            .with_context(|| format!("Failed to open violation store at {}", db_path.display()))?;

        let opener = DuckDbSourceOpener::new(config.database.clone());
        let orchestrator =
            RunOrchestrator::new(rules.clone(), Arc::new(opener), Arc::new(store), config);

        Ok(Self {
            rules,
            orchestrator,
        })
    }
}

/// Relative state dirs live under the project dir.
fn state_dir(project_dir: &Path, config: &EngineConfig) -> PathBuf {
    let dir = PathBuf::from(&config.state_dir);
    if dir.is_absolute() {
        dir
    } else {
        project_dir.join(dir)
    }
}

/// Reads a YAML or JSON document; `.json` files go through serde_json.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("Invalid YAML in {:?}", path))
    }
}

pub fn parse_session(raw: &str) -> Result<SessionId> {
    raw.parse().map_err(|_| {
        DqError::from(DomainError::InvalidRequest(format!(
            "'{}' is not a valid session id",
            raw
        )))
        .into()
    })
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
