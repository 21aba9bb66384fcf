// src/lib.rs
pub mod config;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod services;

// Re-export common types for easier access
pub use config::{DbSettings, ExportConfig, TargetTable};
pub use error::{ExportError, ExportResult};
pub use pipeline::{ExportSummary, run_export};
pub use services::index_reconciler::IndexMap;
pub use services::types::{BatchReport, CommitPolicy, EmbeddingMatrix, UpdateRecord};
