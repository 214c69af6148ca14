// dqcheck-core/src/infrastructure/adapters/duckdb.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use duckdb::Connection;
use duckdb::types::Value as DuckValue;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::{debug, info, instrument, warn};

// Imports Hexagonaux
use crate::domain::configuration::DatabaseDefaults;
use crate::domain::data::{Row, Value};
use crate::domain::source::{DatabaseConnection, DatabaseEngine, SourceDescriptor};
use crate::error::DqError;
use crate::ports::source::{ColumnSchema, DataSource, SourceOpener};

/// View every source is exposed through. Nothing is copied at open time.
const SOURCE_VIEW: &str = "dq_source";
/// Rows the reader thread may hold ahead of the evaluator.
const READ_AHEAD_ROWS: usize = 1024;
/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_CE_DAYS: i32 = 719_163;

/// Opens CSV, Excel and database sources through an embedded DuckDB.
#[derive(Debug, Clone, Default)]
pub struct DuckDbSourceOpener {
    defaults: DatabaseDefaults,
}

impl DuckDbSourceOpener {
    pub fn new(defaults: DatabaseDefaults) -> Self {
        Self { defaults }
    }

    /// SQL that exposes the descriptor as the `dq_source` view.
    fn load_statements(&self, descriptor: &SourceDescriptor) -> Result<Vec<String>, String> {
        match descriptor {
            SourceDescriptor::Csv {
                path,
                delimiter,
                has_header,
            } => {
                ensure_file(path)?;
                let mut options = format!("header = {}", has_header);
                if let Some(d) = delimiter {
                    options.push_str(&format!(", delim = {}", quote_literal(&d.to_string())));
                }
                Ok(vec![format!(
                    "CREATE VIEW {} AS SELECT * FROM read_csv_auto({}, {})",
                    SOURCE_VIEW,
                    quote_literal(&path.to_string_lossy()),
                    options
                )])
            }
            SourceDescriptor::Excel { path, sheet } => {
                ensure_file(path)?;
                let sheet = sheet
                    .as_ref()
                    .map(|s| format!(", sheet = {}", quote_literal(s)))
                    .unwrap_or_default();
                Ok(vec![
                    "INSTALL excel".to_string(),
                    "LOAD excel".to_string(),
                    format!(
                        "CREATE VIEW {} AS SELECT * FROM read_xlsx({}, header = true{})",
                        SOURCE_VIEW,
                        quote_literal(&path.to_string_lossy()),
                        sheet
                    ),
                ])
            }
            SourceDescriptor::Database {
                connection,
                schema,
                table,
            } => {
                let mut statements = self.attach_statements(connection)?;
                let relation = match schema {
                    Some(s) => format!("src.{}.{}", quote_ident(s), quote_ident(table)),
                    None => format!("src.{}", quote_ident(table)),
                };
                statements.push(format!(
                    "CREATE VIEW {} AS SELECT * FROM {}",
                    SOURCE_VIEW, relation
                ));
                Ok(statements)
            }
        }
    }

    fn attach_statements(&self, conn: &DatabaseConnection) -> Result<Vec<String>, String> {
        let file = || -> Result<String, String> {
            let path = conn
                .path
                .as_ref()
                .ok_or_else(|| format!("{} connection requires 'path'", conn.engine))?;
            ensure_file(path)?;
            Ok(quote_literal(&path.to_string_lossy()))
        };

        let statements = match conn.engine {
            DatabaseEngine::DuckDb => vec![format!("ATTACH {} AS src (READ_ONLY)", file()?)],
            DatabaseEngine::Sqlite => vec![
                "INSTALL sqlite".to_string(),
                "LOAD sqlite".to_string(),
                format!("ATTACH {} AS src (TYPE SQLITE, READ_ONLY)", file()?),
            ],
            DatabaseEngine::Postgres => vec![
                "INSTALL postgres".to_string(),
                "LOAD postgres".to_string(),
                format!(
                    "ATTACH {} AS src (TYPE POSTGRES, READ_ONLY)",
                    quote_literal(&self.dsn(conn, "dbname", self.defaults.postgres_port)?)
                ),
            ],
            DatabaseEngine::Mysql => vec![
                "INSTALL mysql".to_string(),
                "LOAD mysql".to_string(),
                format!(
                    "ATTACH {} AS src (TYPE MYSQL, READ_ONLY)",
                    quote_literal(&self.dsn(conn, "database", self.defaults.mysql_port)?)
                ),
            ],
        };
        Ok(statements)
    }

    /// libpq-style `key=value` string understood by the postgres and mysql scanners.
    fn dsn(&self, conn: &DatabaseConnection, db_key: &str, default_port: u16) -> Result<String, String> {
        let host = conn
            .host
            .as_deref()
            .ok_or_else(|| format!("{} connection requires 'host'", conn.engine))?;
        let mut parts = vec![
            format!("host={}", dsn_value(host)),
            format!("port={}", conn.port.unwrap_or(default_port)),
        ];
        if let Some(db) = &conn.database {
            parts.push(format!("{}={}", db_key, dsn_value(db)));
        }
        if let Some(user) = &conn.user {
            parts.push(format!("user={}", dsn_value(user)));
        }
        if let Some(password) = &conn.password {
            parts.push(format!("password={}", dsn_value(password)));
        }
        Ok(parts.join(" "))
    }
}

#[async_trait]
impl SourceOpener for DuckDbSourceOpener {
    #[instrument(skip(self), fields(source = %descriptor))]
    async fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn DataSource>, DqError> {
        let label = descriptor.label();
        let unavailable = |reason: String| DqError::source_unavailable(label.clone(), reason);

        let statements = self.load_statements(descriptor).map_err(&unavailable)?;
        let conn = Connection::open_in_memory().map_err(|e| unavailable(e.to_string()))?;
        for sql in &statements {
            debug!(sql = %redact(sql), "loading source");
            conn.execute_batch(sql).map_err(|e| unavailable(e.to_string()))?;
        }

        let columns = view_columns(&conn).map_err(|e| unavailable(e.to_string()))?;
        if columns.is_empty() {
            return Err(unavailable("source has no columns".to_string()));
        }
        info!(columns = columns.len(), "source opened");

        Ok(Box::new(DuckDbSource {
            label,
            names: columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>().into(),
            columns,
            conn: Mutex::new(Some(conn)),
            cursor: AsyncMutex::new(None),
        }))
    }
}

/// A source read through its own in-memory DuckDB.
///
/// Batches come from a single forward scan of `dq_source`. Asking for an
/// offset behind the scan starts a new one.
pub struct DuckDbSource {
    label: String,
    columns: Vec<ColumnSchema>,
    names: Arc<[String]>,
    conn: Mutex<Option<Connection>>,
    cursor: AsyncMutex<Option<Cursor>>,
}

impl DuckDbSource {
    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>, DqError> {
        self.conn
            .lock()
            .map_err(|_| DqError::InternalError("DuckDB Mutex Poisoned".into()))
    }

    fn unavailable(&self, reason: impl ToString) -> DqError {
        DqError::source_unavailable(self.label.clone(), reason)
    }

    fn start_cursor(&self) -> Result<Cursor, DqError> {
        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or_else(|| self.unavailable("source is closed"))?;
        Cursor::start(conn, self.names.len()).map_err(|e| self.unavailable(e))
    }
}

#[async_trait]
impl DataSource for DuckDbSource {
    fn label(&self) -> &str {
        &self.label
    }

    fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    /// Counts through the view, so file sources are read once more.
    async fn row_count(&self) -> Result<u64, DqError> {
        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or_else(|| self.unavailable("source is closed"))?;
        let count: i64 = conn
            .query_row(&format!("SELECT count(*) FROM {}", SOURCE_VIEW), [], |r| {
                r.get(0)
            })
            .map_err(|e| self.unavailable(e))?;
        Ok(count.max(0) as u64)
    }

    async fn fetch_batch(&self, offset: u64, limit: u64) -> Result<Vec<Row>, DqError> {
        let mut slot = self.cursor.lock().await;
        let cursor = match slot.take() {
            Some(c) if c.position <= offset => c,
            Some(c) => {
                debug!(source = %self.label, from = c.position, to = offset, "rewinding source");
                self.start_cursor()?
            }
            None => self.start_cursor()?,
        };
        let cursor = slot.insert(cursor);

        while cursor.position < offset {
            if cursor.next().await.map_err(|e| self.unavailable(e))?.is_none() {
                return Ok(Vec::new());
            }
        }

        let mut batch = Vec::with_capacity(limit.min(READ_AHEAD_ROWS as u64) as usize);
        while (batch.len() as u64) < limit {
            let index = cursor.position;
            match cursor.next().await.map_err(|e| self.unavailable(e))? {
                Some(values) => batch.push(Row::new(index, self.names.clone(), values)),
                None => break,
            }
        }
        Ok(batch)
    }

    async fn close(&self) -> Result<(), DqError> {
        // Dropping the receiver stops the reader thread at its next send
        self.cursor.lock().await.take();
        let mut guard = self.lock()?;
        if let Some(conn) = guard.take() {
            conn.close()
                .map_err(|(_, e)| DqError::InternalError(format!("closing source: {}", e)))?;
            debug!(source = %self.label, "source closed");
        }
        Ok(())
    }
}

type RowMessage = Result<Vec<Value>, String>;

/// One forward-only scan of `dq_source`, fed by a reader thread that owns a
/// clone of the connection. The bounded channel keeps at most
/// `READ_AHEAD_ROWS` rows in flight.
struct Cursor {
    position: u64,
    rows: mpsc::Receiver<RowMessage>,
}

impl Cursor {
    fn start(conn: &Connection, width: usize) -> Result<Self, String> {
        let reader = conn.try_clone().map_err(|e| e.to_string())?;
        let (tx, rx) = mpsc::channel(READ_AHEAD_ROWS);
        std::thread::Builder::new()
            .name("dq-source-reader".into())
            .spawn(move || read_rows(reader, width, tx))
            .map_err(|e| e.to_string())?;
        Ok(Self {
            position: 0,
            rows: rx,
        })
    }

    /// `None` once the source is exhausted.
    async fn next(&mut self) -> Result<Option<Vec<Value>>, String> {
        match self.rows.recv().await {
            Some(Ok(values)) => {
                self.position += 1;
                Ok(Some(values))
            }
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

fn read_rows(conn: Connection, width: usize, tx: mpsc::Sender<RowMessage>) {
    let scan = || -> Result<(), duckdb::Error> {
        let mut stmt = conn.prepare(&format!("SELECT * FROM {}", SOURCE_VIEW))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                let raw: DuckValue = row.get(i)?;
                values.push(from_duckdb(raw));
            }
            if tx.blocking_send(Ok(values)).is_err() {
                // Consumer gone
                return Ok(());
            }
        }
        Ok(())
    };
    if let Err(e) = scan() {
        warn!(error = %e, "source scan failed");
        // Nobody to tell if the consumer is gone too
        let _ = tx.blocking_send(Err(e.to_string()));
    }
}

fn view_columns(conn: &Connection) -> Result<Vec<ColumnSchema>, duckdb::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info('{}')", SOURCE_VIEW))?;
    let rows = stmt.query_map([], |row| {
        Ok(ColumnSchema {
            name: row.get("name")?,
            data_type: row.get("type")?,
        })
    })?;
    rows.collect()
}

/// Keeps the type the engine inferred; exotic types fall back to text.
fn from_duckdb(raw: DuckValue) -> Value {
    match raw {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(i) => Value::Int(i.into()),
        DuckValue::SmallInt(i) => Value::Int(i.into()),
        DuckValue::Int(i) => Value::Int(i.into()),
        DuckValue::BigInt(i) => Value::Int(i),
        DuckValue::UTinyInt(i) => Value::Int(i.into()),
        DuckValue::USmallInt(i) => Value::Int(i.into()),
        DuckValue::UInt(i) => Value::Int(i.into()),
        DuckValue::UBigInt(i) => i64::try_from(i)
            .map(Value::Int)
            .unwrap_or(Value::Float(i as f64)),
        DuckValue::HugeInt(i) => i64::try_from(i)
            .map(Value::Int)
            .unwrap_or(Value::Float(i as f64)),
        DuckValue::Float(f) => Value::Float(f.into()),
        DuckValue::Double(f) => Value::Float(f),
        DuckValue::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::Text(d.to_string())),
        DuckValue::Text(s) => Value::Text(s),
        DuckValue::Enum(s) => Value::Text(s),
        DuckValue::Date32(days) => NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_CE_DAYS)
            .map(Value::Date)
            .unwrap_or(Value::Null),
        DuckValue::Timestamp(unit, v) => DateTime::from_timestamp_micros(unit.to_micros(v))
            .map(|dt| Value::Timestamp(dt.naive_utc()))
            .unwrap_or(Value::Null),
        other => Value::Text(format!("{:?}", other)),
    }
}

fn ensure_file(path: &Path) -> Result<(), String> {
    if path.is_file() {
        Ok(())
    } else {
        Err(format!("file not found: {}", path.display()))
    }
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Bare when safe, otherwise single-quoted with `\\` and `'` escaped.
fn dsn_value(s: &str) -> String {
    let plain = !s.is_empty() && !s.chars().any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn redact(sql: &str) -> String {
    match sql.find("password=") {
        Some(i) => format!("{}password=***", &sql[..i]),
        None => sql.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use futures::StreamExt;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv(content: &str) -> Result<NamedTempFile> {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile()?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        Ok(file)
    }

    #[tokio::test]
    async fn test_csv_source_keeps_types_and_order() -> Result<()> {
        let file = csv("id,name,score,joined\n1,Ana,9.5,2024-01-02\n2,,7,2024-02-03\n3,Zoe,,2024-03-04\n")?;
        let source = DuckDbSourceOpener::default()
            .open(&SourceDescriptor::csv(file.path()))
            .await?;

        assert_eq!(source.column_names(), vec!["id", "name", "score", "joined"]);
        assert_eq!(source.row_count().await?, 3);

        let first = source.fetch_batch(0, 2).await?;
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].value("id"), &Value::Int(1));
        assert_eq!(first[0].value("score"), &Value::Float(9.5));
        assert_eq!(
            first[0].value("joined"),
            &Value::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        );
        assert!(first[1].value("name").is_null());

        let rest = source.fetch_batch(2, 2).await?;
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].index(), 2);
        assert!(rest[0].value("score").is_null());

        source.close().await?;
        source.close().await?;
        assert!(source.fetch_batch(0, 1).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_custom_delimiter() -> Result<()> {
        let file = csv("a;b\nx;1\n")?;
        let descriptor = SourceDescriptor::Csv {
            path: file.path().to_path_buf(),
            delimiter: Some(';'),
            has_header: true,
        };
        let source = DuckDbSourceOpener::default().open(&descriptor).await?;
        assert_eq!(source.column_names(), vec!["a", "b"]);
        source.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_is_source_unavailable() {
        let err = DuckDbSourceOpener::default()
            .open(&SourceDescriptor::csv("/definitely/not/here.csv"))
            .await
            .err()
            .expect("open should fail");
        assert_eq!(err.kind(), crate::error::ErrorKind::SourceUnavailable);
        assert!(err.to_string().contains("file not found"));
    }

    #[tokio::test]
    async fn test_duckdb_file_table() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db_path = dir.path().join("shop.duckdb");
        {
            let conn = Connection::open(&db_path)?;
            conn.execute_batch(
                "CREATE SCHEMA sales; CREATE TABLE sales.orders (id INTEGER, total DOUBLE); \
                 INSERT INTO sales.orders VALUES (1, 10.0), (2, -3.5);",
            )?;
        }

        let descriptor = SourceDescriptor::Database {
            connection: DatabaseConnection {
                engine: DatabaseEngine::DuckDb,
                path: Some(db_path.clone()),
                host: None,
                port: None,
                database: None,
                user: None,
                password: None,
            },
            schema: Some("sales".into()),
            table: "orders".into(),
        };
        let source = DuckDbSourceOpener::default().open(&descriptor).await?;
        let rows = source.fetch_batch(0, 10).await?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].value("total"), &Value::Float(-3.5));
        source.close().await?;

        let wrong_table = SourceDescriptor::Database {
            connection: DatabaseConnection {
                engine: DatabaseEngine::DuckDb,
                path: Some(db_path),
                host: None,
                port: None,
                database: None,
                user: None,
                password: None,
            },
            schema: None,
            table: "nope".into(),
        };
        let err = DuckDbSourceOpener::default().open(&wrong_table).await.err();
        assert!(matches!(
            err.map(|e| e.kind()),
            Some(crate::error::ErrorKind::SourceUnavailable)
        ));
        Ok(())
    }

    #[test]
    fn test_dsn_uses_default_ports() {
        let opener = DuckDbSourceOpener::default();
        let conn = DatabaseConnection {
            engine: DatabaseEngine::Postgres,
            path: None,
            host: Some("db.internal".into()),
            port: None,
            database: Some("sales".into()),
            user: Some("dq".into()),
            password: Some("s3cret".into()),
        };
        let dsn = opener.dsn(&conn, "dbname", 5432).unwrap();
        assert_eq!(dsn, "host=db.internal port=5432 dbname=sales user=dq password=s3cret");
        assert!(!redact(&format!("ATTACH '{}'", dsn)).contains("s3cret"));
    }

    #[test]
    fn test_dsn_quotes_awkward_values() {
        let opener = DuckDbSourceOpener::default();
        let conn = DatabaseConnection {
            engine: DatabaseEngine::Mysql,
            path: None,
            host: Some("db.internal".into()),
            port: Some(3307),
            database: Some("sales data".into()),
            user: Some("dq".into()),
            password: Some(r"it's a\secret".into()),
        };
        let dsn = opener.dsn(&conn, "database", 3306).unwrap();
        assert_eq!(
            dsn,
            r"host=db.internal port=3307 database='sales data' user=dq password='it\'s a\\secret'"
        );
        assert_eq!(dsn_value(""), "''");
    }

    #[tokio::test]
    async fn test_batches_cover_every_row_once_in_order() -> Result<()> {
        let mut content = String::from("id,label\n");
        for i in 1..=10 {
            content.push_str(&format!("{},row {}\n", i, i));
        }
        let file = csv(&content)?;
        let source = DuckDbSourceOpener::default()
            .open(&SourceDescriptor::csv(file.path()))
            .await?;

        let batches: Vec<Vec<Row>> = crate::ports::source::batch_stream(source.as_ref(), 3)
            .map(|b| b.unwrap())
            .collect()
            .await;
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);

        let rows: Vec<&Row> = batches.iter().flatten().collect();
        let indices: Vec<u64> = rows.iter().map(|r| r.index()).collect();
        assert_eq!(indices, (0..10).collect::<Vec<u64>>());
        let ids: Vec<Value> = rows.iter().map(|r| r.value("id").clone()).collect();
        assert_eq!(ids, (1..=10).map(Value::Int).collect::<Vec<_>>());
        // batch boundaries
        assert_eq!(batches[1][0].value("label"), &Value::from("row 4"));
        assert_eq!(batches[3][0].value("id"), &Value::Int(10));

        source.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_skips_ahead_and_rewinds() -> Result<()> {
        let file = csv("id\n1\n2\n3\n4\n5\n")?;
        let source = DuckDbSourceOpener::default()
            .open(&SourceDescriptor::csv(file.path()))
            .await?;

        let ahead = source.fetch_batch(3, 10).await?;
        assert_eq!(ahead.len(), 2);
        assert_eq!(ahead[0].index(), 3);
        assert_eq!(ahead[0].value("id"), &Value::Int(4));

        let again = source.fetch_batch(0, 2).await?;
        assert_eq!(again[0].index(), 0);
        assert_eq!(again[0].value("id"), &Value::Int(1));

        assert!(source.fetch_batch(9, 2).await?.is_empty());
        assert_eq!(source.row_count().await?, 5);
        source.close().await?;
        Ok(())
    }
}
