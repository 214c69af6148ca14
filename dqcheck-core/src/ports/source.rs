// dqcheck-core/src/ports/source.rs

// A tabular source as the engine sees it: a schema, a row count and
// forward-only batches. Where the rows come from is the adapter's business.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::domain::data::Row;
use crate::domain::source::SourceDescriptor;
use crate::error::DqError;

// Struct simple pour décrire une colonne (indépendant de la DB)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
}

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Label of the source for logs and run records.
    fn label(&self) -> &str;

    fn columns(&self) -> &[ColumnSchema];

    async fn row_count(&self) -> Result<u64, DqError>;

    /// Rows `offset..offset + limit` in source order. Fewer than `limit` rows
    /// means the end was reached.
    async fn fetch_batch(&self, offset: u64, limit: u64) -> Result<Vec<Row>, DqError>;

    /// Releases the underlying handle. Idempotent.
    async fn close(&self) -> Result<(), DqError>;

    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name.clone()).collect()
    }
}

#[async_trait]
pub trait SourceOpener: Send + Sync {
    /// Fails with a source-unavailable error before any row is produced.
    async fn open(&self, descriptor: &SourceDescriptor) -> Result<Box<dyn DataSource>, DqError>;
}

/// Lazy stream of batches of at most `batch_size` rows.
pub fn batch_stream(
    source: &dyn DataSource,
    batch_size: u64,
) -> BoxStream<'_, Result<Vec<Row>, DqError>> {
    let batch_size = batch_size.max(1);
    stream::unfold(Some(0u64), move |state| async move {
        let offset = state?;
        match source.fetch_batch(offset, batch_size).await {
            Ok(rows) if rows.is_empty() => None,
            Ok(rows) => {
                let fetched = rows.len() as u64;
                let next = (fetched == batch_size).then_some(offset + fetched);
                Some((Ok(rows), next))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}

/// Lazy stream of single rows, fetched `batch_size` at a time.
pub fn row_stream(source: &dyn DataSource, batch_size: u64) -> BoxStream<'_, Result<Row, DqError>> {
    batch_stream(source, batch_size)
        .flat_map(|batch| {
            let items: Vec<Result<Row, DqError>> = match batch {
                Ok(rows) => rows.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            stream::iter(items)
        })
        .boxed()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::data::Value;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory source used by the application tests.
    pub(crate) struct MockSource {
        pub columns: Vec<ColumnSchema>,
        pub rows: Vec<Vec<Value>>,
        pub fetches: AtomicUsize,
        pub closed: AtomicBool,
    }

    impl MockSource {
        pub(crate) fn new(columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
            Self {
                columns: columns
                    .iter()
                    .map(|c| ColumnSchema {
                        name: c.to_string(),
                        data_type: "VARCHAR".into(),
                    })
                    .collect(),
                rows,
                fetches: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl DataSource for MockSource {
        fn label(&self) -> &str {
            "mock"
        }

        fn columns(&self) -> &[ColumnSchema] {
            &self.columns
        }

        async fn row_count(&self) -> Result<u64, DqError> {
            Ok(self.rows.len() as u64)
        }

        async fn fetch_batch(&self, offset: u64, limit: u64) -> Result<Vec<Row>, DqError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let names: Arc<[String]> = self.column_names().into();
            Ok(self
                .rows
                .iter()
                .enumerate()
                .skip(offset as usize)
                .take(limit as usize)
                .map(|(i, values)| Row::new(i as u64, names.clone(), values.clone()))
                .collect())
        }

        async fn close(&self) -> Result<(), DqError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_batches_are_bounded_and_lazy() -> anyhow::Result<()> {
        let rows = (0..7).map(|i| vec![Value::Int(i)]).collect();
        let source = MockSource::new(&["n"], rows);

        let batches: Vec<_> = batch_stream(&source, 3).collect().await;
        let sizes: Vec<usize> = batches.iter().map(|b| b.as_ref().unwrap().len()).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 3);

        let indexes: Vec<u64> = row_stream(&source, 4)
            .map(|r| r.unwrap().index())
            .collect()
            .await;
        assert_eq!(indexes, (0..7).collect::<Vec<_>>());
        Ok(())
    }

    #[tokio::test]
    async fn test_exact_multiple_ends_with_empty_fetch() -> anyhow::Result<()> {
        let rows = (0..4).map(|i| vec![Value::Int(i)]).collect();
        let source = MockSource::new(&["n"], rows);
        let batches: Vec<_> = batch_stream(&source, 2).collect().await;
        assert_eq!(batches.len(), 2);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 3);
        Ok(())
    }
}
