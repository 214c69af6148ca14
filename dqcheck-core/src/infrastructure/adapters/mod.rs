// dqcheck-core/src/infrastructure/adapters/mod.rs

pub mod duckdb;
pub mod duckdb_store;
pub mod json_rules;
pub mod memory;

pub use self::duckdb::{DuckDbSource, DuckDbSourceOpener};
pub use duckdb_store::DuckDbViolationStore;
pub use json_rules::JsonRuleRepository;
pub use memory::{InMemoryRuleRepository, InMemoryViolationStore};
