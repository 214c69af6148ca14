// dqcheck-core/src/ports/mod.rs

// What the engine needs from the outside world, without knowing how it's done.

pub mod rule_repository;
pub mod source;
pub mod violation_store;

pub use rule_repository::RuleRepository;
pub use source::{ColumnSchema, DataSource, SourceOpener, batch_stream, row_stream};
pub use violation_store::ViolationStore;
