// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};

use cf_embeddings_lib::db::PgStoreConnector;
use cf_embeddings_lib::{DbSettings, config, run_export};

mod cli;

use cli::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    info!(
        "Starting collaborative-filtering embedding export (v{})",
        env!("CARGO_PKG_VERSION")
    );

    // .env values must be in place before clap reads env-backed flags
    config::load_env_files();
    let cli = Cli::parse();

    let export_config = cli.export_config();
    let target = cli.target_table().context("Invalid target table")?;

    let connector = PgStoreConnector::new(DbSettings::from_env(), target);

    match run_export(&export_config, &connector).await {
        Ok(summary) => {
            info!(
                "Export completed: {} rows in model, {} identifiers mapped, {} records prepared",
                summary.matrix_rows, summary.mapped_identifiers, summary.records
            );
            if summary.skipped_rows > 0 || summary.unmatched_identifiers > 0 {
                warn!(
                    "{} model rows had no identifier and {} identifiers had no model row",
                    summary.skipped_rows, summary.unmatched_identifiers
                );
            }
            Ok(())
        }
        Err(e) => {
            error!("Embedding export failed: {}", e);
            Err(e).context("Embedding export failed")
        }
    }
}
