// dqcheck-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::rules::RuleId;

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error("Invalid rule definition: {0}")]
    #[diagnostic(
        code(dqcheck::domain::invalid_rule),
        help("Each rule_type requires its own fields (see `dqcheck rules create --help`).")
    )]
    InvalidRule(String),

    #[error("Invalid request: {0}")]
    #[diagnostic(code(dqcheck::domain::invalid_request))]
    InvalidRequest(String),

    #[error("Rule {0} not found")]
    #[diagnostic(code(dqcheck::domain::rule_not_found))]
    RuleNotFound(RuleId),

    #[error("Session '{0}' not found")]
    #[diagnostic(
        code(dqcheck::domain::session_not_found),
        help("Session ids are printed at the end of `dqcheck run`.")
    )]
    SessionNotFound(String),

    #[error("Rule '{rule}' failed to execute: {message}")]
    #[diagnostic(code(dqcheck::domain::rule_execution))]
    RuleExecution { rule: String, message: String },
}
