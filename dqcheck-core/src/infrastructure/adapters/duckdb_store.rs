// dqcheck-core/src/infrastructure/adapters/duckdb_store.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{Connection, params};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, instrument};

use crate::domain::error::DomainError;
use crate::domain::rules::{RuleId, RuleType, Severity};
use crate::domain::run::{KpiRecord, RunSummary};
use crate::domain::violation::{Pagination, SessionId, Violation, ViolationPage, ViolationType};
use crate::error::DqError;
use crate::ports::violation_store::ViolationStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS dq_runs (
    session_id VARCHAR PRIMARY KEY,
    status VARCHAR NOT NULL,
    dq_score DOUBLE NOT NULL,
    started_at VARCHAR NOT NULL,
    summary VARCHAR NOT NULL
);
CREATE TABLE IF NOT EXISTS dq_violations (
    session_id VARCHAR NOT NULL,
    seq BIGINT NOT NULL,
    row_index BIGINT,
    row_number BIGINT,
    column_name VARCHAR,
    rule_id UBIGINT NOT NULL,
    rule_name VARCHAR NOT NULL,
    rule_type VARCHAR NOT NULL,
    violation_type VARCHAR NOT NULL,
    actual_value VARCHAR,
    expected_value VARCHAR,
    details VARCHAR NOT NULL,
    severity VARCHAR NOT NULL
);
CREATE TABLE IF NOT EXISTS dq_kpi_history (
    session_id VARCHAR NOT NULL,
    rule_id UBIGINT NOT NULL,
    rule_name VARCHAR NOT NULL,
    rule_type VARCHAR NOT NULL,
    kpi_value DOUBLE NOT NULL,
    passed BOOLEAN NOT NULL,
    recorded_at VARCHAR NOT NULL
);
";

/// Violation store backed by a DuckDB file (or memory).
#[derive(Clone)]
pub struct DuckDbViolationStore {
    conn: Arc<Mutex<Connection>>,
    max_page_size: u64,
}

impl DuckDbViolationStore {
    pub fn open(path: &Path, max_page_size: u64) -> Result<Self, DqError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        info!(path = ?path, "violation store opened");
        Self::with_connection(conn, max_page_size)
    }

    pub fn in_memory(max_page_size: u64) -> Result<Self, DqError> {
        Self::with_connection(Connection::open_in_memory()?, max_page_size)
    }

    fn with_connection(conn: Connection, max_page_size: u64) -> Result<Self, DqError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_page_size,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DqError> {
        self.conn
            .lock()
            .map_err(|_| DqError::InternalError("DuckDB Mutex Poisoned".into()))
    }

    fn run_exists(conn: &Connection, session: SessionId) -> Result<bool, DqError> {
        let n: i64 = conn.query_row(
            "SELECT count(*) FROM dq_runs WHERE session_id = ?",
            params![session.to_string()],
            |r| r.get(0),
        )?;
        Ok(n > 0)
    }
}

#[async_trait]
impl ViolationStore for DuckDbViolationStore {
    #[instrument(skip(self, violations), fields(count = violations.len()))]
    async fn append(&self, session: SessionId, violations: &[Violation]) -> Result<(), DqError> {
        if violations.is_empty() {
            return Ok(());
        }
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| DqError::persistence(e.to_string()))?;
        let session_key = session.to_string();

        let next: i64 = tx
            .query_row(
                "SELECT coalesce(max(seq) + 1, 0) FROM dq_violations WHERE session_id = ?",
                params![session_key],
                |r| r.get(0),
            )
            .map_err(|e| DqError::persistence(e.to_string()))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO dq_violations VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .map_err(|e| DqError::persistence(e.to_string()))?;
            for (i, v) in violations.iter().enumerate() {
                stmt.execute(params![
                    session_key,
                    next + i as i64,
                    v.row_index.map(|x| x as i64),
                    v.row_number.map(|x| x as i64),
                    v.column_name,
                    v.rule_id.0,
                    v.rule_name,
                    v.rule_type.as_str(),
                    v.violation_type.as_str(),
                    v.actual_value,
                    v.expected_value,
                    v.details,
                    v.severity.as_str(),
                ])
                .map_err(|e| DqError::persistence(e.to_string()))?;
            }
        }

        tx.commit().map_err(|e| DqError::persistence(e.to_string()))?;
        debug!(session = %session, "violations appended");
        Ok(())
    }

    async fn save_run(&self, summary: &RunSummary) -> Result<(), DqError> {
        let json = serde_json::to_string(summary).map_err(|e| DqError::persistence(e.to_string()))?;
        let session_key = summary.session_id.to_string();
        let kpis = summary.kpi_records();

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| DqError::persistence(e.to_string()))?;
        tx.execute(
            "INSERT INTO dq_runs VALUES (?, ?, ?, ?, ?)",
            params![
                session_key,
                summary.status.to_string(),
                summary.dq_score,
                summary.started_at.to_rfc3339(),
                json
            ],
        )
        .map_err(|e| DqError::persistence(e.to_string()))?;

        for kpi in &kpis {
            tx.execute(
                "INSERT INTO dq_kpi_history VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    session_key,
                    kpi.rule_id.0,
                    kpi.rule_name,
                    kpi.rule_type.as_str(),
                    kpi.value,
                    kpi.passed,
                    kpi.recorded_at.to_rfc3339()
                ],
            )
            .map_err(|e| DqError::persistence(e.to_string()))?;
        }

        tx.commit().map_err(|e| DqError::persistence(e.to_string()))?;
        if !kpis.is_empty() {
            info!(session = %summary.session_id, count = kpis.len(), "📈 KPI values recorded");
        }
        Ok(())
    }

    async fn discard(&self, session: SessionId) -> Result<(), DqError> {
        let conn = self.lock()?;
        let removed = conn
            .execute(
                "DELETE FROM dq_violations WHERE session_id = ?",
                params![session.to_string()],
            )
            .map_err(|e| DqError::persistence(e.to_string()))?;
        debug!(session = %session, removed, "discarded unfinished session");
        Ok(())
    }

    async fn get_run(&self, session: SessionId) -> Result<RunSummary, DqError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT summary FROM dq_runs WHERE session_id = ?")?;
        let mut rows = stmt.query(params![session.to_string()])?;
        let Some(row) = rows.next()? else {
            return Err(DomainError::SessionNotFound(session.to_string()).into());
        };
        let json: String = row.get(0)?;
        serde_json::from_str(&json).map_err(|e| DqError::persistence(e.to_string()))
    }

    async fn get_page(
        &self,
        session: SessionId,
        page: u64,
        page_size: u64,
    ) -> Result<ViolationPage, DqError> {
        let conn = self.lock()?;
        if !Self::run_exists(&conn, session)? {
            return Err(DomainError::SessionNotFound(session.to_string()).into());
        }
        let session_key = session.to_string();

        let total: i64 = conn.query_row(
            "SELECT count(*) FROM dq_violations WHERE session_id = ?",
            params![session_key],
            |r| r.get(0),
        )?;
        let pagination = Pagination::resolve(page, page_size, self.max_page_size, total.max(0) as u64);

        let mut stmt = conn.prepare(
            "SELECT row_index, row_number, column_name, rule_id, rule_name, rule_type, \
             violation_type, actual_value, expected_value, details, severity \
             FROM dq_violations WHERE session_id = ? ORDER BY seq LIMIT ? OFFSET ?",
        )?;
        let mut rows = stmt.query(params![
            session_key,
            pagination.page_size as i64,
            pagination.offset().min(i64::MAX as u64) as i64
        ])?;

        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            let rule_type: String = row.get(5)?;
            let violation_type: String = row.get(6)?;
            let severity: String = row.get(10)?;
            items.push(Violation {
                row_index: row.get::<_, Option<i64>>(0)?.map(|x| x as u64),
                row_number: row.get::<_, Option<i64>>(1)?.map(|x| x as u64),
                column_name: row.get(2)?,
                rule_id: RuleId(row.get(3)?),
                rule_name: row.get(4)?,
                rule_type: RuleType::from_str(&rule_type).map_err(DqError::persistence)?,
                violation_type: ViolationType::from_str(&violation_type)
                    .map_err(DqError::persistence)?,
                actual_value: row.get(7)?,
                expected_value: row.get(8)?,
                details: row.get(9)?,
                severity: Severity::from_str(&severity).map_err(DqError::persistence)?,
            });
        }

        Ok(ViolationPage { items, pagination })
    }

    async fn list_runs(&self) -> Result<Vec<RunSummary>, DqError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT summary FROM dq_runs ORDER BY started_at DESC")?;
        let mut rows = stmt.query([])?;
        let mut runs = Vec::new();
        while let Some(row) = rows.next()? {
            let json: String = row.get(0)?;
            runs.push(serde_json::from_str(&json).map_err(|e| DqError::persistence(e.to_string()))?);
        }
        Ok(runs)
    }

    async fn kpi_history(&self, rule_id: Option<RuleId>) -> Result<Vec<KpiRecord>, DqError> {
        let conn = self.lock()?;
        let mut sql = String::from(
            "SELECT session_id, rule_id, rule_name, rule_type, kpi_value, passed, recorded_at \
             FROM dq_kpi_history",
        );
        if rule_id.is_some() {
            sql.push_str(" WHERE rule_id = ?");
        }
        sql.push_str(" ORDER BY recorded_at, rule_id");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = match rule_id {
            Some(id) => stmt.query(params![id.0])?,
            None => stmt.query([])?,
        };

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let session: String = row.get(0)?;
            let rule_type: String = row.get(3)?;
            let recorded_at: String = row.get(6)?;
            records.push(KpiRecord {
                session_id: session
                    .parse::<SessionId>()
                    .map_err(|e| DqError::persistence(e.to_string()))?,
                rule_id: RuleId(row.get(1)?),
                rule_name: row.get(2)?,
                rule_type: RuleType::from_str(&rule_type).map_err(DqError::persistence)?,
                value: row.get(4)?,
                passed: row.get(5)?,
                recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
                    .map_err(|e| DqError::persistence(e.to_string()))?
                    .with_timezone(&Utc),
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::infrastructure::adapters::memory::tests::{
        kpi_outcome, sample_run, sample_violations,
    };
    use anyhow::Result;

    #[tokio::test]
    async fn test_pages_follow_append_order() -> Result<()> {
        let store = DuckDbViolationStore::in_memory(500)?;
        let session = SessionId::new();
        let violations = sample_violations(25);
        store.append(session, &violations[..10]).await?;
        store.append(session, &violations[10..]).await?;
        store.save_run(&sample_run(session)).await?;

        let p1 = store.get_page(session, 1, 10).await?;
        assert_eq!(p1.items, violations[..10].to_vec());
        assert_eq!((p1.pagination.total, p1.pagination.total_pages), (25, 3));

        let p3 = store.get_page(session, 3, 10).await?;
        assert_eq!(p3.items, violations[20..].to_vec());

        let beyond = store.get_page(session, 9, 10).await?;
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.pagination.total, 25);
        Ok(())
    }

    #[tokio::test]
    async fn test_run_round_trip_and_unknown_session() -> Result<()> {
        let store = DuckDbViolationStore::in_memory(500)?;
        let session = SessionId::new();
        let run = sample_run(session);
        store.save_run(&run).await?;
        assert_eq!(store.get_run(session).await?, run);
        assert_eq!(store.list_runs().await?.len(), 1);

        let unknown = SessionId::new();
        assert_eq!(store.get_run(unknown).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            store.get_page(unknown, 1, 10).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_sessions_are_partitioned_and_file_backed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("state").join("violations.duckdb");
        let (a, b) = (SessionId::new(), SessionId::new());
        {
            let store = DuckDbViolationStore::open(&path, 500)?;
            store.append(a, &sample_violations(3)).await?;
            store.append(b, &sample_violations(5)).await?;
            store.save_run(&sample_run(a)).await?;
            store.save_run(&sample_run(b)).await?;
        }
        let reopened = DuckDbViolationStore::open(&path, 500)?;
        assert_eq!(reopened.get_page(a, 1, 50).await?.pagination.total, 3);
        assert_eq!(reopened.get_page(b, 1, 50).await?.pagination.total, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_page_size_is_clamped() -> Result<()> {
        let store = DuckDbViolationStore::in_memory(4)?;
        let session = SessionId::new();
        store.append(session, &sample_violations(9)).await?;
        store.save_run(&sample_run(session)).await?;
        let page = store.get_page(session, 0, 100).await?;
        assert_eq!(page.pagination.page, 1);
        assert_eq!(page.pagination.page_size, 4);
        assert_eq!(page.items.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_kpi_values_are_recorded_for_passing_runs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("violations.duckdb");
        let session = SessionId::new();
        let run = RunSummary {
            outcomes: vec![kpi_outcome(7, 98.5, true), kpi_outcome(8, 3.0, false)],
            ..sample_run(session)
        };
        {
            let store = DuckDbViolationStore::open(&path, 500)?;
            store.save_run(&run).await?;
        }

        let store = DuckDbViolationStore::open(&path, 500)?;
        let history = store.kpi_history(Some(RuleId(7))).await?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].session_id, session);
        assert_eq!(history[0].value, 98.5);
        assert!(history[0].passed);
        assert_eq!(history[0].rule_type, RuleType::Kpi);
        assert_eq!(store.kpi_history(None).await?.len(), 2);
        assert_eq!(store.get_run(session).await?.outcomes[0].aggregate_value, Some(98.5));
        Ok(())
    }

    #[tokio::test]
    async fn test_discard_removes_unfinished_session() -> Result<()> {
        let store = DuckDbViolationStore::in_memory(500)?;
        let (kept, dropped) = (SessionId::new(), SessionId::new());
        store.append(kept, &sample_violations(2)).await?;
        store.append(dropped, &sample_violations(4)).await?;
        store.discard(dropped).await?;
        store.save_run(&sample_run(kept)).await?;

        let conn = store.lock()?;
        let left: i64 = conn.query_row("SELECT count(*) FROM dq_violations", [], |r| r.get(0))?;
        assert_eq!(left, 2);
        Ok(())
    }
}
