// dqcheck-core/src/application/mod.rs

pub mod orchestrator;
pub mod rule_store;

// --- RE-EXPORTS (FACADE PATTERN) ---
// `use dqcheck_core::application::{RuleStore, RunOrchestrator};`

pub use orchestrator::RunOrchestrator;
pub use rule_store::RuleStore;
