// dqcheck-core/src/application/orchestrator.rs

use chrono::Utc;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

// Imports Hexagonaux
use crate::application::rule_store::RuleStore;
use crate::domain::configuration::EngineConfig;
use crate::domain::error::DomainError;
use crate::domain::evaluation::RuleEvaluator;
use crate::domain::rules::{Rule, RuleId};
use crate::domain::run::{KpiRecord, RuleOutcome, RunContext, RunReport, RunStatus, RunSummary};
use crate::domain::source::SourceDescriptor;
use crate::domain::violation::{SessionId, ViolationPage};
use crate::error::DqError;
use crate::ports::source::{DataSource, SourceOpener, batch_stream};
use crate::ports::violation_store::ViolationStore;

/// Ties a source, a rule selection and a violation store into one run.
pub struct RunOrchestrator {
    rules: Arc<RuleStore>,
    opener: Arc<dyn SourceOpener>,
    store: Arc<dyn ViolationStore>,
    config: EngineConfig,
}

impl RunOrchestrator {
    pub fn new(
        rules: Arc<RuleStore>,
        opener: Arc<dyn SourceOpener>,
        store: Arc<dyn ViolationStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            rules,
            opener,
            store,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluates the selected rules over every row of `source`.
    ///
    /// Nothing is written if the rules cannot be resolved or the source cannot
    /// be opened. Once scanning has started, violations are appended batch by
    /// batch; cancelling stops between batches and still records the run.
    #[instrument(skip(self, cancel), fields(source = %source))]
    pub async fn execute_run(
        &self,
        rule_ids: &[RuleId],
        source: &SourceDescriptor,
        cancel: CancellationToken,
    ) -> Result<RunSummary, DqError> {
        let (selected, skipped) = self.resolve_rules(rule_ids)?;
        let data = self.opener.open(source).await?;

        let result = self
            .scan(data.as_ref(), &selected, skipped, source, &cancel)
            .await;

        // Always released, whatever happened during the scan
        if let Err(e) = data.close().await {
            warn!(error = %e, "failed to close source");
        }
        if let Err(e) = &result {
            error!("❌ Run failed: {}", e);
        }
        result
    }

    /// `execute_run` plus the first page of violations.
    pub async fn execute_run_with_first_page(
        &self,
        rule_ids: &[RuleId],
        source: &SourceDescriptor,
        cancel: CancellationToken,
    ) -> Result<RunReport, DqError> {
        let summary = self.execute_run(rule_ids, source, cancel).await?;
        let violations = self
            .store
            .get_page(summary.session_id, 1, self.config.pagination.default_page_size)
            .await?;
        Ok(RunReport {
            session_id: summary.session_id,
            dq_score: summary.dq_score,
            summary,
            violations,
        })
    }

    /// A page of a finished run; `None` uses the configured default size.
    pub async fn violations(
        &self,
        session: SessionId,
        page: u64,
        page_size: Option<u64>,
    ) -> Result<ViolationPage, DqError> {
        let size = page_size.unwrap_or(self.config.pagination.default_page_size);
        self.store.get_page(session, page, size).await
    }

    pub async fn summary(&self, session: SessionId) -> Result<RunSummary, DqError> {
        self.store.get_run(session).await
    }

    /// Recorded runs, most recent first.
    pub async fn runs(&self) -> Result<Vec<RunSummary>, DqError> {
        self.store.list_runs().await
    }

    /// Measured kpi/aggregate values across runs, oldest first.
    pub async fn kpi_history(&self, rule_id: Option<RuleId>) -> Result<Vec<KpiRecord>, DqError> {
        self.store.kpi_history(rule_id).await
    }

    /// Active rules in request order, plus the inactive ids that were asked for.
    fn resolve_rules(&self, rule_ids: &[RuleId]) -> Result<(Vec<Rule>, Vec<RuleId>), DqError> {
        if rule_ids.is_empty() {
            return Err(DomainError::InvalidRequest("at least one rule id is required".into()).into());
        }

        let snapshot = self.rules.snapshot()?;
        let mut selected: Vec<Rule> = Vec::new();
        let mut skipped = Vec::new();

        for id in rule_ids {
            if selected.iter().any(|r| r.rule_id == *id) || skipped.contains(id) {
                continue;
            }
            let rule = snapshot
                .iter()
                .find(|r| r.rule_id == *id)
                .ok_or(DomainError::RuleNotFound(*id))?;
            if rule.is_active {
                selected.push(rule.clone());
            } else {
                warn!(rule_id = %id, "skipping inactive rule");
                skipped.push(*id);
            }
        }

        if selected.is_empty() {
            return Err(DomainError::InvalidRequest(
                "none of the selected rules is active".into(),
            )
            .into());
        }
        Ok((selected, skipped))
    }

    async fn scan(
        &self,
        data: &dyn DataSource,
        selected: &[Rule],
        skipped: Vec<RuleId>,
        source: &SourceDescriptor,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, DqError> {
        let context = RunContext {
            session_id: SessionId::new(),
            source: source.label(),
            rule_ids: selected.iter().map(|r| r.rule_id).collect(),
            skipped_rule_ids: skipped,
            started_at: Utc::now(),
        };
        let session = context.session_id;

        let result = self.evaluate(data, selected, context, source, cancel).await;
        if result.is_err() {
            // No run record will ever point at these
            if let Err(e) = self.store.discard(session).await {
                warn!(session = %session, error = %e, "failed to discard partial violations");
            }
        }
        result
    }

    async fn evaluate(
        &self,
        data: &dyn DataSource,
        selected: &[Rule],
        context: RunContext,
        source: &SourceDescriptor,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, DqError> {
        let start = Instant::now();
        let session = context.session_id;
        info!(session = %session, rules = selected.len(), "🚀 Run started");

        let mut evaluator =
            RuleEvaluator::new(selected, &data.column_names(), &self.config.evaluation)?
                .with_header_rows(source.header_rows());
        let mut batches = batch_stream(data, self.config.evaluation.batch_size);
        let mut status = RunStatus::Completed;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    status = RunStatus::Cancelled;
                    break;
                }
                next = batches.next() => next,
            };
            let Some(batch) = next else { break };
            let rows = batch?;
            let violations = evaluator.evaluate_batch(&rows);
            debug!(rows = rows.len(), violations = violations.len(), "batch evaluated");
            self.store.append(session, &violations).await?;
        }
        drop(batches);

        // Aggregates over a partial scan would be meaningless
        if status == RunStatus::Completed {
            let tail = evaluator.finish();
            self.store.append(session, &tail).await?;
        } else {
            warn!(session = %session, rows = evaluator.rows_seen(), "run cancelled");
        }

        let total_rows = evaluator.rows_seen();
        let evaluated: Vec<(&Rule, RuleOutcome)> = evaluator
            .outcomes()
            .filter(|(_, dataset_scope, _)| status == RunStatus::Completed || !dataset_scope)
            .map(|(rule, dataset_scope, tally)| {
                (rule, RuleOutcome::new(rule, dataset_scope, tally, total_rows))
            })
            .collect();

        let summary = context.complete(status, total_rows, &evaluated, Utc::now());
        self.store.save_run(&summary).await?;

        info!(
            session = %session,
            rows = total_rows,
            violations = summary.total_violations,
            score = summary.dq_score,
            "✅ Run finished in {:.2?}",
            start.elapsed()
        );
        Ok(summary)
    }
}
