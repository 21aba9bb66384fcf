// src/cli.rs

use clap::Parser;
use std::path::PathBuf;

use cf_embeddings_lib::config::{
    DEFAULT_EMBEDDING_LAYER, DEFAULT_ID_COLUMN, DEFAULT_KEY_COLUMN, DEFAULT_MODEL_PATH,
    DEFAULT_RATINGS_PATH, DEFAULT_TARGET_TABLE, DEFAULT_VECTOR_COLUMN,
};
use cf_embeddings_lib::{CommitPolicy, ExportConfig, ExportResult, TargetTable};

/// Copy learned movie embeddings from a trained model into PostgreSQL.
#[derive(Debug, Parser)]
#[command(name = "export_cf_embeddings", version, about)]
pub struct Cli {
    /// Safetensors file holding the trained model weights
    #[arg(long, env = "MODEL_PATH", default_value = DEFAULT_MODEL_PATH)]
    pub model: PathBuf,

    /// Name of the embedding layer inside the model
    #[arg(long, env = "EMBEDDING_LAYER", default_value = DEFAULT_EMBEDDING_LAYER)]
    pub layer: String,

    /// Ratings file used at training time to assign indices
    #[arg(long, env = "RATINGS_PATH", default_value = DEFAULT_RATINGS_PATH)]
    pub ratings: PathBuf,

    /// Identifier column in the ratings file
    #[arg(long, env = "ID_COLUMN", default_value = DEFAULT_ID_COLUMN)]
    pub id_column: String,

    #[arg(long, env = "TARGET_TABLE", default_value = DEFAULT_TARGET_TABLE)]
    pub table: String,

    #[arg(long, env = "VECTOR_COLUMN", default_value = DEFAULT_VECTOR_COLUMN)]
    pub vector_column: String,

    #[arg(long, env = "KEY_COLUMN", default_value = DEFAULT_KEY_COLUMN)]
    pub key_column: String,

    /// What to do when some rows could not be updated
    #[arg(long, value_enum, default_value_t = CommitPolicy::BestEffort)]
    pub commit_policy: CommitPolicy,

    /// Load a persisted `index,identifier` map instead of reading the ratings file
    #[arg(long, conflicts_with = "write_index_map")]
    pub index_map: Option<PathBuf>,

    /// Save the derived index map to this file
    #[arg(long)]
    pub write_index_map: Option<PathBuf>,

    /// Stop before connecting to the database
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    pub fn export_config(&self) -> ExportConfig {
        ExportConfig {
            model_path: self.model.clone(),
            layer: self.layer.clone(),
            ratings_path: self.ratings.clone(),
            id_column: self.id_column.clone(),
            index_map_path: self.index_map.clone(),
            write_index_map_path: self.write_index_map.clone(),
            commit_policy: self.commit_policy,
            dry_run: self.dry_run,
        }
    }

    pub fn target_table(&self) -> ExportResult<TargetTable> {
        TargetTable::new(&self.table, &self.vector_column, &self.key_column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_map_into_config() {
        let cli = Cli::try_parse_from([
            "export_cf_embeddings",
            "--model",
            "model.safetensors",
            "--ratings",
            "ratings.csv",
            "--commit-policy",
            "all-or-nothing",
            "--dry-run",
        ])
        .unwrap();

        let config = cli.export_config();
        assert_eq!(config.model_path, PathBuf::from("model.safetensors"));
        assert_eq!(config.ratings_path, PathBuf::from("ratings.csv"));
        assert_eq!(config.commit_policy, CommitPolicy::AllOrNothing);
        assert!(config.dry_run);
        assert!(config.index_map_path.is_none());
    }

    #[test]
    fn test_index_map_flags_conflict() {
        let result = Cli::try_parse_from([
            "export_cf_embeddings",
            "--index-map",
            "a.csv",
            "--write-index-map",
            "b.csv",
        ]);
        assert!(result.is_err());
    }
}
