// dqcheck-core/src/domain/mod.rs

pub mod configuration;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod rules;
pub mod run;
pub mod source;
pub mod violation;

// Re-exports pratiques pour simplifier les imports ailleurs
pub use error::DomainError;
