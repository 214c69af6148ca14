// dqcheck-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::{DatabaseError, InfrastructureError};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DqError {
    // --- ERREURS DU DOMAINE (Rules, Sessions, Evaluation) ---
    #[error(transparent)]
    Domain(#[from] DomainError),

    // --- ERREURS D'INFRASTRUCTURE (Sources, Stores, Config) ---
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    // --- ERREURS GÉNÉRIQUES / APPLICATIVES ---
    #[error("Internal Error: {0}")]
    InternalError(String),
}

/// Error classes a caller can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    SourceUnavailable,
    RuleExecution,
    Persistence,
    Configuration,
    Internal,
}

impl ErrorKind {
    /// HTTP-style status for collaborators that expose the engine over a transport.
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::RuleExecution => 422,
            ErrorKind::SourceUnavailable => 502,
            ErrorKind::Persistence | ErrorKind::Configuration | ErrorKind::Internal => 500,
        }
    }
}

impl DqError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DqError::Domain(err) => match err {
                DomainError::InvalidRule(_) | DomainError::InvalidRequest(_) => {
                    ErrorKind::Validation
                }
                DomainError::RuleNotFound(_) | DomainError::SessionNotFound(_) => {
                    ErrorKind::NotFound
                }
                DomainError::RuleExecution { .. } => ErrorKind::RuleExecution,
            },
            DqError::Infrastructure(err) => match err {
                InfrastructureError::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
                InfrastructureError::ConfigError(_) | InfrastructureError::YamlError(_) => {
                    ErrorKind::Configuration
                }
                InfrastructureError::Persistence(_)
                | InfrastructureError::Io(_)
                | InfrastructureError::JsonError(_)
                | InfrastructureError::Database(DatabaseError::DuckDB(_)) => ErrorKind::Persistence,
            },
            DqError::InternalError(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status()
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::new(self.kind(), self.to_string())
    }

    pub(crate) fn persistence(message: impl Into<String>) -> Self {
        DqError::Infrastructure(InfrastructureError::Persistence(message.into()))
    }

    pub(crate) fn source_unavailable(source_name: impl Into<String>, reason: impl ToString) -> Self {
        DqError::Infrastructure(InfrastructureError::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.to_string(),
        })
    }
}

/// Structured `{status, message}` payload.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: kind.status(),
            kind,
            message: message.into(),
        }
    }
}

// Manual implementation to avoid duplicate enum variant but keep ergonomics
impl From<std::io::Error> for DqError {
    fn from(err: std::io::Error) -> Self {
        DqError::Infrastructure(InfrastructureError::Io(err))
    }
}

impl From<duckdb::Error> for DqError {
    fn from(err: duckdb::Error) -> Self {
        DqError::Infrastructure(InfrastructureError::from(err))
    }
}
