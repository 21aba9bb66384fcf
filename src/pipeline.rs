// src/pipeline.rs

use log::{info, warn};
use std::time::Instant;

use crate::config::ExportConfig;
use crate::error::ExportResult;
use crate::services::batch_writer::{StoreConnector, log_batch_report, pair_records, write_embeddings};
use crate::services::index_reconciler::{load_index_map, reconcile_index_map, write_index_map};
use crate::services::model_loader::load_embedding_matrix;
use crate::services::types::BatchReport;

/// What an export run did, stage by stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub matrix_rows: usize,
    pub dim: usize,
    pub mapped_identifiers: usize,
    pub records: usize,
    /// Matrix rows with no identifier in the index map.
    pub skipped_rows: usize,
    /// Mapped identifiers whose index is past the end of the matrix.
    pub unmatched_identifiers: usize,
    /// `None` for dry runs.
    pub report: Option<BatchReport>,
}

/// Runs model loading, index reconciliation, pairing and the batch write in
/// that order. Each stage fails before the next one starts, so no connection
/// is opened unless the model and the index map were both loaded.
pub async fn run_export<C: StoreConnector>(
    config: &ExportConfig,
    connector: &C,
) -> ExportResult<ExportSummary> {
    let start = Instant::now();

    info!("[1/3] Loading embedding matrix");
    let matrix = load_embedding_matrix(&config.model_path, &config.layer)?;

    info!("[2/3] Reconciling index map");
    let index_map = match &config.index_map_path {
        Some(path) => load_index_map(path)?,
        None => reconcile_index_map(&config.ratings_path, &config.id_column)?,
    };
    if let Some(path) = &config.write_index_map_path {
        write_index_map(&index_map, path)?;
    }
    if index_map.len() != matrix.num_rows() {
        warn!(
            "Index map has {} identifiers but the embedding matrix has {} rows",
            index_map.len(),
            matrix.num_rows()
        );
    }

    let pairing = pair_records(&matrix, &index_map);
    let mut summary = ExportSummary {
        matrix_rows: matrix.num_rows(),
        dim: matrix.dim(),
        mapped_identifiers: index_map.len(),
        records: pairing.records.len(),
        skipped_rows: pairing.unmapped_rows,
        unmatched_identifiers: pairing.unmatched_identifiers,
        report: None,
    };

    if config.dry_run {
        info!(
            "[3/3] Dry run: would update {} rows with {}-dimensional embeddings",
            summary.records, summary.dim
        );
        return Ok(summary);
    }

    info!("[3/3] Writing embeddings to the database");
    let report = write_embeddings(
        connector,
        &pairing.records,
        matrix.dim(),
        config.commit_policy,
    )
    .await?;
    log_batch_report(&report);
    summary.report = Some(report);

    info!("Export finished in {:.2?}", start.elapsed());
    Ok(summary)
}
