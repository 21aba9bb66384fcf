// src/services/types.rs

/// Learned embedding table, one row per training-time index.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    rows: Vec<Vec<f32>>,
    dim: usize,
}

impl EmbeddingMatrix {
    /// Builds a matrix from rows that must all share the same length.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, String> {
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != dim) {
            return Err(format!(
                "row {} has {} columns, expected {}",
                idx,
                row.len(),
                dim
            ));
        }
        Ok(Self { rows, dim })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.rows.iter().map(|r| r.as_slice())
    }
}

/// A vector bound to the natural key of the row it updates.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRecord {
    pub identifier: i64,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowStatus {
    Updated,
    /// The UPDATE matched no row for this identifier.
    NotFound,
    Failed { message: String },
}

/// Result of writing one record, keyed by its offset in the submitted batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RowOutcome {
    pub offset: usize,
    pub identifier: i64,
    pub status: RowStatus,
}

/// What to do with the transaction when some rows were not updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CommitPolicy {
    /// Commit the rows that succeeded and report the rest.
    #[default]
    BestEffort,
    /// Roll everything back if any row was not updated.
    AllOrNothing,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchReport {
    pub submitted: usize,
    pub updated: usize,
    pub not_found: usize,
    pub failed: usize,
    /// Outcomes for every row that was not `Updated`, in batch order.
    pub problems: Vec<RowOutcome>,
    pub committed: bool,
}

impl BatchReport {
    pub fn record(&mut self, outcome: RowOutcome) {
        self.submitted += 1;
        match outcome.status {
            RowStatus::Updated => self.updated += 1,
            RowStatus::NotFound => {
                self.not_found += 1;
                self.problems.push(outcome);
            }
            RowStatus::Failed { .. } => {
                self.failed += 1;
                self.problems.push(outcome);
            }
        }
    }

    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }

    /// Whether the transaction should be committed under `policy`.
    pub fn should_commit(&self, policy: CommitPolicy) -> bool {
        match policy {
            CommitPolicy::BestEffort => true,
            CommitPolicy::AllOrNothing => self.is_clean(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(offset: usize, status: RowStatus) -> RowOutcome {
        RowOutcome {
            offset,
            identifier: offset as i64 + 100,
            status,
        }
    }

    #[test]
    fn test_matrix_rejects_ragged_rows() {
        let err = EmbeddingMatrix::from_rows(vec![vec![0.1, 0.2], vec![0.3]]).unwrap_err();
        assert!(err.contains("row 1"));
    }

    #[test]
    fn test_empty_matrix_has_zero_dim() {
        let matrix = EmbeddingMatrix::from_rows(Vec::new()).unwrap();
        assert_eq!(matrix.dim(), 0);
        assert_eq!(matrix.num_rows(), 0);
    }

    #[test]
    fn test_report_counts_and_policy() {
        let mut report = BatchReport::default();
        report.record(outcome(0, RowStatus::Updated));
        report.record(outcome(1, RowStatus::NotFound));
        report.record(outcome(
            2,
            RowStatus::Failed {
                message: "boom".to_string(),
            },
        ));

        assert_eq!(report.submitted, 3);
        assert_eq!(report.updated, 1);
        assert_eq!(report.not_found, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.problems.len(), 2);
        assert_eq!(report.problems[0].offset, 1);
        assert!(report.should_commit(CommitPolicy::BestEffort));
        assert!(!report.should_commit(CommitPolicy::AllOrNothing));
    }

    #[test]
    fn test_clean_report_commits_under_all_or_nothing() {
        let mut report = BatchReport::default();
        report.record(outcome(0, RowStatus::Updated));
        assert!(report.is_clean());
        assert!(report.should_commit(CommitPolicy::AllOrNothing));
    }
}
