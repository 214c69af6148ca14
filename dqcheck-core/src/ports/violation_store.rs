// dqcheck-core/src/ports/violation_store.rs

use async_trait::async_trait;

use crate::domain::rules::RuleId;
use crate::domain::run::{KpiRecord, RunSummary};
use crate::domain::violation::{SessionId, Violation, ViolationPage};
use crate::error::DqError;

/// Violations and run records, partitioned by session.
#[async_trait]
pub trait ViolationStore: Send + Sync {
    /// Appends in order. Called once per batch while a run is in progress.
    async fn append(&self, session: SessionId, violations: &[Violation]) -> Result<(), DqError>;

    /// Stores the final run record and its kpi values. A session without a
    /// run record is unknown to readers.
    async fn save_run(&self, summary: &RunSummary) -> Result<(), DqError>;

    /// Drops whatever was appended for a session that will never get a run record.
    async fn discard(&self, session: SessionId) -> Result<(), DqError>;

    async fn get_run(&self, session: SessionId) -> Result<RunSummary, DqError>;

    /// 1-indexed page of violations in append order. `page` 0 reads as 1 and
    /// `page_size` is clamped to the store's maximum.
    async fn get_page(
        &self,
        session: SessionId,
        page: u64,
        page_size: u64,
    ) -> Result<ViolationPage, DqError>;

    /// Run records, most recent first.
    async fn list_runs(&self) -> Result<Vec<RunSummary>, DqError>;

    /// Recorded kpi/aggregate values, oldest first, optionally for one rule.
    async fn kpi_history(&self, rule_id: Option<RuleId>) -> Result<Vec<KpiRecord>, DqError>;
}
