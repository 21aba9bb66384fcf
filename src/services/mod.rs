// src/services/mod.rs
pub mod batch_writer;
pub mod index_reconciler;
pub mod model_loader;
pub mod types;

// Re-export commonly used types
pub use types::{BatchReport, CommitPolicy, EmbeddingMatrix, RowOutcome, RowStatus, UpdateRecord};
