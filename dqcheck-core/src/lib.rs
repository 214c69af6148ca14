// dqcheck-core/src/lib.rs

// 1. Documentation
#![allow(missing_docs)] // On autorise le manque de doc pour le moment

// 2. Memory safety
#![deny(unsafe_code)]
// 3. Robustness
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
// 4. Performance
#![warn(clippy::perf)]

// --- MODULES HEXAGONAUX ---

// 1. Ports (Interfaces / Traits)
// Rule repository, data sources, violation store
pub mod ports;

// 2. Domain (Cœur du métier)
// Rules, values, evaluation, violations, runs.
// Ne dépend de RIEN d'autre (ni infra, ni app).
pub mod domain;

// 3. Infrastructure (Adapters)
// DuckDB sources and store, JSON rules file, config loader
pub mod infrastructure;

// 4. Application (Use Cases)
// Rule store service, run orchestrator
pub mod application;

// --- GESTION DES ERREURS GLOBALE ---
pub mod error;

// --- RE-EXPORTS (FACADE) ---
pub use error::{DqError, ErrorKind, ErrorResponse};
