// dqcheck-core/src/infrastructure/adapters/memory.rs

// Process-local adapters. Used by embedders that do not want files on disk,
// and by the application tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::domain::error::DomainError;
use crate::domain::rules::{Rule, RuleId};
use crate::domain::run::{KpiRecord, RunSummary};
use crate::domain::violation::{Pagination, SessionId, Violation, ViolationPage};
use crate::error::DqError;
use crate::ports::rule_repository::RuleRepository;
use crate::ports::violation_store::ViolationStore;

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, DqError> {
    m.lock()
        .map_err(|_| DqError::InternalError("Store Mutex Poisoned".into()))
}

#[derive(Default)]
struct Sessions {
    violations: HashMap<SessionId, Vec<Violation>>,
    runs: HashMap<SessionId, RunSummary>,
}

pub struct InMemoryViolationStore {
    inner: Mutex<Sessions>,
    max_page_size: u64,
}

impl InMemoryViolationStore {
    pub fn new(max_page_size: u64) -> Self {
        Self {
            inner: Mutex::new(Sessions::default()),
            max_page_size,
        }
    }

    /// Number of violations appended for a session, run record or not.
    pub fn appended(&self, session: SessionId) -> usize {
        self.inner
            .lock()
            .map(|s| s.violations.get(&session).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Violations held across every session.
    pub fn total_appended(&self) -> usize {
        self.inner
            .lock()
            .map(|s| s.violations.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

impl Default for InMemoryViolationStore {
    fn default() -> Self {
        Self::new(500)
    }
}

#[async_trait]
impl ViolationStore for InMemoryViolationStore {
    async fn append(&self, session: SessionId, violations: &[Violation]) -> Result<(), DqError> {
        let mut inner = lock(&self.inner)?;
        inner
            .violations
            .entry(session)
            .or_default()
            .extend_from_slice(violations);
        Ok(())
    }

    async fn save_run(&self, summary: &RunSummary) -> Result<(), DqError> {
        let mut inner = lock(&self.inner)?;
        inner.runs.insert(summary.session_id, summary.clone());
        Ok(())
    }

    async fn discard(&self, session: SessionId) -> Result<(), DqError> {
        let mut inner = lock(&self.inner)?;
        inner.violations.remove(&session);
        Ok(())
    }

    async fn get_run(&self, session: SessionId) -> Result<RunSummary, DqError> {
        let inner = lock(&self.inner)?;
        inner
            .runs
            .get(&session)
            .cloned()
            .ok_or_else(|| DomainError::SessionNotFound(session.to_string()).into())
    }

    async fn get_page(
        &self,
        session: SessionId,
        page: u64,
        page_size: u64,
    ) -> Result<ViolationPage, DqError> {
        let inner = lock(&self.inner)?;
        if !inner.runs.contains_key(&session) {
            return Err(DomainError::SessionNotFound(session.to_string()).into());
        }
        let all = inner.violations.get(&session).map_or(&[][..], Vec::as_slice);
        let pagination = Pagination::resolve(page, page_size, self.max_page_size, all.len() as u64);
        let items = all
            .iter()
            .skip(usize::try_from(pagination.offset()).unwrap_or(usize::MAX))
            .take(pagination.page_size as usize)
            .cloned()
            .collect();
        Ok(ViolationPage { items, pagination })
    }

    async fn list_runs(&self) -> Result<Vec<RunSummary>, DqError> {
        let inner = lock(&self.inner)?;
        let mut runs: Vec<RunSummary> = inner.runs.values().cloned().collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    async fn kpi_history(&self, rule_id: Option<RuleId>) -> Result<Vec<KpiRecord>, DqError> {
        let inner = lock(&self.inner)?;
        let mut records: Vec<KpiRecord> = inner
            .runs
            .values()
            .flat_map(RunSummary::kpi_records)
            .filter(|r| rule_id.is_none_or(|id| r.rule_id == id))
            .collect();
        records.sort_by(|a, b| {
            a.recorded_at
                .cmp(&b.recorded_at)
                .then(a.rule_id.cmp(&b.rule_id))
        });
        Ok(records)
    }
}

/// Rule repository that forgets everything on drop.
#[derive(Default)]
pub struct InMemoryRuleRepository {
    rules: Mutex<Vec<Rule>>,
}

impl InMemoryRuleRepository {
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self {
            rules: Mutex::new(rules),
        }
    }
}

impl RuleRepository for InMemoryRuleRepository {
    fn load(&self) -> Result<Vec<Rule>, DqError> {
        Ok(lock(&self.rules)?.clone())
    }

    fn save(&self, rules: &[Rule]) -> Result<(), DqError> {
        *lock(&self.rules)? = rules.to_vec();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::rules::{RuleId, RuleType, Severity};
    use crate::domain::run::{Assessment, RuleOutcome, RunStatus};
    use crate::domain::violation::ViolationType;
    use chrono::Utc;
    use proptest::prelude::*;

    pub(crate) fn sample_violations(n: u64) -> Vec<Violation> {
        (0..n)
            .map(|i| Violation {
                row_index: Some(i),
                row_number: Some(i + 2),
                column_name: Some("email".into()),
                rule_id: RuleId(1),
                rule_name: "Email format".into(),
                rule_type: RuleType::Pattern,
                violation_type: ViolationType::PatternMismatch,
                actual_value: Some(format!("user{}@", i)),
                expected_value: Some("email".into()),
                details: "value does not match the email pattern".into(),
                severity: Severity::Medium,
            })
            .collect()
    }

    pub(crate) fn sample_run(session: SessionId) -> RunSummary {
        let now = Utc::now();
        RunSummary {
            session_id: session,
            status: RunStatus::Completed,
            source: "csv:customers.csv".into(),
            rule_ids: vec![RuleId(1)],
            skipped_rule_ids: vec![],
            started_at: now,
            finished_at: now,
            total_records_checked: 100,
            total_violations: 0,
            evaluation_errors: 0,
            rules_passed: 1,
            rules_failed: 0,
            dq_score: 100.0,
            assessment: Assessment::Excellent,
            outcomes: vec![],
            recommendations: vec![],
        }
    }

    pub(crate) fn kpi_outcome(rule_id: u64, value: f64, passed: bool) -> RuleOutcome {
        RuleOutcome {
            rule_id: RuleId(rule_id),
            rule_name: format!("KPI {}", rule_id),
            rule_type: RuleType::Kpi,
            severity: Severity::Medium,
            checks: 1,
            violations: u64::from(!passed),
            evaluation_errors: 0,
            compliance: if passed { 1.0 } else { 0.0 },
            passed,
            aggregate_value: Some(value),
        }
    }

    #[tokio::test]
    async fn test_kpi_history_spans_runs() -> anyhow::Result<()> {
        let store = InMemoryViolationStore::default();
        let (first, second) = (sample_run(SessionId::new()), sample_run(SessionId::new()));
        let second = RunSummary {
            finished_at: first.finished_at + chrono::Duration::seconds(5),
            outcomes: vec![kpi_outcome(2, 75.0, true), kpi_outcome(3, 1.0, false)],
            ..second
        };
        let first = RunSummary {
            outcomes: vec![kpi_outcome(2, 60.0, true)],
            ..first
        };
        store.save_run(&second).await?;
        store.save_run(&first).await?;

        let values: Vec<f64> = store
            .kpi_history(Some(RuleId(2)))
            .await?
            .iter()
            .map(|r| r.value)
            .collect();
        assert_eq!(values, vec![60.0, 75.0]);
        assert_eq!(store.kpi_history(None).await?.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_violations_before_run_record_are_hidden() -> anyhow::Result<()> {
        let store = InMemoryViolationStore::default();
        let session = SessionId::new();
        store.append(session, &sample_violations(3)).await?;
        assert!(store.get_page(session, 1, 10).await.is_err());
        assert_eq!(store.appended(session), 3);

        store.save_run(&sample_run(session)).await?;
        assert_eq!(store.get_page(session, 1, 10).await?.items.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_discard_drops_orphaned_violations() -> anyhow::Result<()> {
        let store = InMemoryViolationStore::default();
        let (kept, dropped) = (SessionId::new(), SessionId::new());
        store.append(kept, &sample_violations(2)).await?;
        store.append(dropped, &sample_violations(3)).await?;
        store.discard(dropped).await?;
        assert_eq!(store.appended(dropped), 0);
        assert_eq!(store.total_appended(), 2);
        Ok(())
    }

    #[test]
    fn test_rule_repository_replaces_set() -> anyhow::Result<()> {
        let repo = InMemoryRuleRepository::default();
        assert!(repo.load()?.is_empty());
        repo.save(&[])?;
        assert!(repo.load()?.is_empty());
        Ok(())
    }

    proptest! {
        // Walking every page returns each stored violation exactly once, in order.
        #[test]
        fn pages_concatenate_to_the_full_list(total in 0u64..120, page_size in 1u64..40) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let store = InMemoryViolationStore::new(500);
                let session = SessionId::new();
                let all = sample_violations(total);
                store.append(session, &all).await.unwrap();
                store.save_run(&sample_run(session)).await.unwrap();

                let first = store.get_page(session, 1, page_size).await.unwrap();
                let mut seen = first.items.clone();
                for page in 2..=first.pagination.total_pages {
                    let p = store.get_page(session, page, page_size).await.unwrap();
                    prop_assert_eq!(p.pagination.total, total);
                    seen.extend(p.items);
                }
                prop_assert_eq!(seen, all);
                Ok(())
            })?;
        }
    }
}
