// src/services/batch_writer.rs

use async_trait::async_trait;
use log::{debug, info, warn};
use std::time::Instant;

use crate::config::MAX_LOGGED_ROW_PROBLEMS;
use crate::error::{ExportError, ExportResult};
use crate::services::index_reconciler::IndexMap;
use crate::services::types::{
    BatchReport, CommitPolicy, EmbeddingMatrix, RowStatus, UpdateRecord,
};

/// Update records plus what was left out while pairing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pairing {
    pub records: Vec<UpdateRecord>,
    /// Matrix rows whose index has no identifier.
    pub unmapped_rows: usize,
    /// Identifiers whose index lies beyond the last matrix row.
    pub unmatched_identifiers: usize,
}

/// Binds every matrix row to the identifier mapped at its index.
pub fn pair_records(matrix: &EmbeddingMatrix, index_map: &IndexMap) -> Pairing {
    let mut pairing = Pairing::default();
    for (index, row) in matrix.rows().enumerate() {
        match index_map.identifier(index) {
            Some(identifier) => pairing.records.push(UpdateRecord {
                identifier,
                embedding: row.to_vec(),
            }),
            None => pairing.unmapped_rows += 1,
        }
    }
    pairing.unmatched_identifiers = index_map.len().saturating_sub(matrix.num_rows());

    info!(
        "Prepared {} embeddings for database update",
        pairing.records.len()
    );
    if pairing.unmapped_rows > 0 {
        warn!(
            "{} embedding rows have no mapped identifier and were skipped",
            pairing.unmapped_rows
        );
    }
    if pairing.unmatched_identifiers > 0 {
        warn!(
            "{} identifiers have no embedding row; the index map may not match the model",
            pairing.unmatched_identifiers
        );
    }
    pairing
}

/// An open connection to the table receiving the embeddings.
#[async_trait]
pub trait EmbeddingStore: Send {
    /// Human-readable `table.column` the vectors are written to.
    fn target(&self) -> String;

    /// Declared dimension of the vector column, if it has one.
    async fn vector_dimension(&mut self) -> ExportResult<Option<usize>>;

    /// Runs one UPDATE per record inside a single transaction, capturing
    /// per-row failures, then commits or rolls back according to `policy`.
    async fn write_batch(
        &mut self,
        records: &[UpdateRecord],
        policy: CommitPolicy,
    ) -> ExportResult<BatchReport>;

    /// Releases the connection.
    async fn close(self);
}

/// Opens an `EmbeddingStore`; failures here happen before any write.
#[async_trait]
pub trait StoreConnector: Sync {
    type Store: EmbeddingStore;

    async fn connect(&self) -> ExportResult<Self::Store>;
}

/// Connects, checks the vector dimension, writes the batch and always
/// closes the store afterwards.
pub async fn write_embeddings<C: StoreConnector>(
    connector: &C,
    records: &[UpdateRecord],
    dim: usize,
    policy: CommitPolicy,
) -> ExportResult<BatchReport> {
    if records.is_empty() {
        info!("No embeddings to write, skipping database update");
        return Ok(BatchReport::default());
    }

    let mut store = connector.connect().await?;
    info!("Connection successful.");

    let result = write_with_store(&mut store, records, dim, policy).await;
    store.close().await;
    result
}

async fn write_with_store<S: EmbeddingStore>(
    store: &mut S,
    records: &[UpdateRecord],
    dim: usize,
    policy: CommitPolicy,
) -> ExportResult<BatchReport> {
    match store.vector_dimension().await? {
        Some(declared) if declared != dim => {
            return Err(ExportError::DimensionMismatch {
                column: store.target(),
                expected: declared,
                actual: dim,
            });
        }
        Some(declared) => debug!("Column {} declares dimension {}", store.target(), declared),
        None => debug!("Column {} has no declared dimension", store.target()),
    }

    info!(
        "Executing batch UPDATE of {} rows into {} ({:?})",
        records.len(),
        store.target(),
        policy
    );
    let start = Instant::now();
    let report = store.write_batch(records, policy).await?;
    info!(
        "Update command sent for {} rows in {:.2?}",
        report.submitted,
        start.elapsed()
    );
    Ok(report)
}

/// Logs the outcome of a batch, listing per-row problems up to a limit.
pub fn log_batch_report(report: &BatchReport) {
    info!(
        "Batch result: {} submitted, {} updated, {} not found, {} failed",
        report.submitted, report.updated, report.not_found, report.failed
    );

    for outcome in report.problems.iter().take(MAX_LOGGED_ROW_PROBLEMS) {
        match &outcome.status {
            RowStatus::NotFound => warn!(
                "Row offset {}: identifier {} not found",
                outcome.offset, outcome.identifier
            ),
            RowStatus::Failed { message } => warn!(
                "Row offset {}: identifier {} failed: {}",
                outcome.offset, outcome.identifier, message
            ),
            RowStatus::Updated => {}
        }
    }
    if report.problems.len() > MAX_LOGGED_ROW_PROBLEMS {
        warn!(
            "... and {} more rows were not updated",
            report.problems.len() - MAX_LOGGED_ROW_PROBLEMS
        );
    }

    if report.committed {
        info!("Database transaction committed successfully.");
    } else if report.submitted > 0 {
        warn!("Database transaction was rolled back; no embeddings were stored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::types::RowOutcome;
    use std::sync::{Arc, Mutex};

    fn matrix(rows: Vec<Vec<f32>>) -> EmbeddingMatrix {
        EmbeddingMatrix::from_rows(rows).unwrap()
    }

    #[test]
    fn test_pairs_rows_with_mapped_identifiers() {
        let m = matrix(vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
        let map = IndexMap::from_identifiers([101, 102]);

        let pairing = pair_records(&m, &map);
        assert_eq!(
            pairing.records,
            vec![
                UpdateRecord {
                    identifier: 101,
                    embedding: vec![0.1, 0.2],
                },
                UpdateRecord {
                    identifier: 102,
                    embedding: vec![0.3, 0.4],
                },
            ]
        );
        assert_eq!(pairing.unmapped_rows, 0);
        assert_eq!(pairing.unmatched_identifiers, 0);
    }

    #[test]
    fn test_rows_without_identifier_are_skipped() {
        // Embedding tables are often sized with spare rows beyond the vocabulary.
        let m = matrix(vec![vec![1.0], vec![2.0], vec![3.0]]);
        let map = IndexMap::from_identifiers([7]);

        let pairing = pair_records(&m, &map);
        assert_eq!(pairing.records.len(), 1);
        assert_eq!(pairing.records[0].identifier, 7);
        assert_eq!(pairing.records[0].embedding, vec![1.0]);
        assert_eq!(pairing.unmapped_rows, 2);
    }

    #[test]
    fn test_identifiers_beyond_matrix_are_counted() {
        let m = matrix(vec![vec![1.0]]);
        let map = IndexMap::from_identifiers([7, 8, 9]);

        let pairing = pair_records(&m, &map);
        assert_eq!(pairing.records.len(), 1);
        assert_eq!(pairing.unmatched_identifiers, 2);
    }

    #[derive(Default)]
    struct Calls {
        closed: bool,
        writes: usize,
    }

    struct FakeStore {
        calls: Arc<Mutex<Calls>>,
        dimension: Option<usize>,
    }

    #[async_trait]
    impl EmbeddingStore for FakeStore {
        fn target(&self) -> String {
            "movies.cf_embedding".to_string()
        }

        async fn vector_dimension(&mut self) -> ExportResult<Option<usize>> {
            Ok(self.dimension)
        }

        async fn write_batch(
            &mut self,
            records: &[UpdateRecord],
            policy: CommitPolicy,
        ) -> ExportResult<BatchReport> {
            self.calls.lock().unwrap().writes += 1;
            let mut report = BatchReport::default();
            for (offset, record) in records.iter().enumerate() {
                report.record(RowOutcome {
                    offset,
                    identifier: record.identifier,
                    status: RowStatus::Updated,
                });
            }
            report.committed = report.should_commit(policy);
            Ok(report)
        }

        async fn close(self) {
            self.calls.lock().unwrap().closed = true;
        }
    }

    struct FakeConnector {
        calls: Arc<Mutex<Calls>>,
        dimension: Option<usize>,
    }

    #[async_trait]
    impl StoreConnector for FakeConnector {
        type Store = FakeStore;

        async fn connect(&self) -> ExportResult<FakeStore> {
            Ok(FakeStore {
                calls: self.calls.clone(),
                dimension: self.dimension,
            })
        }
    }

    fn records() -> Vec<UpdateRecord> {
        vec![UpdateRecord {
            identifier: 1,
            embedding: vec![0.5, 0.5],
        }]
    }

    #[tokio::test]
    async fn test_dimension_mismatch_aborts_before_write() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let connector = FakeConnector {
            calls: calls.clone(),
            dimension: Some(3),
        };

        let err = write_embeddings(&connector, &records(), 2, CommitPolicy::BestEffort)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExportError::DimensionMismatch {
                expected: 3,
                actual: 2,
                ..
            }
        ));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.writes, 0);
        assert!(calls.closed, "store must be closed after a failed check");
    }

    #[tokio::test]
    async fn test_undeclared_dimension_is_accepted() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let connector = FakeConnector {
            calls: calls.clone(),
            dimension: None,
        };

        let report = write_embeddings(&connector, &records(), 2, CommitPolicy::AllOrNothing)
            .await
            .unwrap();
        assert_eq!(report.updated, 1);
        assert!(report.committed);
        assert!(calls.lock().unwrap().closed);
    }

    #[tokio::test]
    async fn test_empty_batch_does_not_connect() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let connector = FakeConnector {
            calls: calls.clone(),
            dimension: Some(2),
        };

        let report = write_embeddings(&connector, &[], 2, CommitPolicy::BestEffort)
            .await
            .unwrap();
        assert_eq!(report, BatchReport::default());
        assert!(!calls.lock().unwrap().closed);
    }
}
