// src/config.rs

use log::{info, warn};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{ExportError, ExportResult};
use crate::services::types::CommitPolicy;

pub const DEFAULT_MODEL_PATH: &str = "../saved_models/collaboration_filter.01.safetensors";
pub const DEFAULT_RATINGS_PATH: &str = "../../movielens_data/full/ratings.csv";
pub const DEFAULT_EMBEDDING_LAYER: &str = "movie_embedding";
pub const DEFAULT_ID_COLUMN: &str = "movieId";
pub const DEFAULT_TARGET_TABLE: &str = "movies";
pub const DEFAULT_VECTOR_COLUMN: &str = "cf_embedding";
pub const DEFAULT_KEY_COLUMN: &str = "movieid";

pub const ENV_FILE_PATHS: [&str; 3] = [".env", ".env.local", "../.env"];
pub const WALLET_IDENTITY_FILE: &str = "ewallet.p12";
pub const WALLET_CA_FILE: &str = "ca.pem";

pub const CONNECT_TIMEOUT_SECS: u64 = 10;
pub const POOL_CONNECTION_TIMEOUT_SECS: u64 = 15;
pub const PROGRESS_LOG_INTERVAL: usize = 5_000;
pub const MAX_LOGGED_ROW_PROBLEMS: usize = 50;

/// Loads the first `.env` file found, without overriding variables that are
/// already set. Returns the path that was loaded.
pub fn load_env_files() -> Option<&'static str> {
    for path in ENV_FILE_PATHS {
        if Path::new(path).exists() {
            match dotenv::from_filename(path) {
                Ok(_) => {
                    info!("Loaded environment variables from {}", path);
                    return Some(path);
                }
                Err(e) => warn!("Failed to load environment from {}: {}", path, e),
            }
        }
    }
    info!("No .env file found, using environment variables from system");
    None
}

fn value_or_placeholder(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    placeholder: &str,
) -> String {
    lookup(key).unwrap_or_else(|| {
        warn!("{} not found in environment, using placeholder", key);
        placeholder.to_string()
    })
}

/// Client certificate bundle used for TLS connections.
#[derive(Clone)]
pub struct WalletSettings {
    pub dir: PathBuf,
    pub password: String,
}

impl WalletSettings {
    pub fn identity_path(&self) -> PathBuf {
        self.dir.join(WALLET_IDENTITY_FILE)
    }

    pub fn ca_path(&self) -> PathBuf {
        self.dir.join(WALLET_CA_FILE)
    }
}

/// Credentials and connection target for the embedding table's database.
#[derive(Clone)]
pub struct DbSettings {
    pub user: String,
    pub password: String,
    /// libpq key/value string or `postgres://` URL.
    pub dsn: String,
    pub wallet: Option<WalletSettings>,
}

impl DbSettings {
    /// Reads `DB_USER`, `DB_PASSWORD`, `DB_DSN`, `WALLET_PATH` and
    /// `WALLET_PASSWORD`. Missing values fall back to placeholders that will
    /// fail at connect time; the wallet is only used when `WALLET_PATH` is set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`DbSettings::from_env`] with values taken from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let user = value_or_placeholder(&lookup, "DB_USER", "BAD_DB_USER");
        let password = value_or_placeholder(&lookup, "DB_PASSWORD", "BAD_DB_PASSWORD");
        let dsn = value_or_placeholder(&lookup, "DB_DSN", "BAD_DB_DSN");

        let wallet = match lookup("WALLET_PATH") {
            Some(dir) => Some(WalletSettings {
                dir: PathBuf::from(dir),
                password: value_or_placeholder(&lookup, "WALLET_PASSWORD", "BAD_WALLET_PASSWORD"),
            }),
            None => {
                warn!("WALLET_PATH not set, connecting without a wallet");
                None
            }
        };

        let settings = Self {
            user,
            password,
            dsn,
            wallet,
        };
        settings.log_summary();
        settings
    }

    pub fn log_summary(&self) {
        info!("Database connection parameters:");
        info!("  User: {}", self.user);
        info!(
            "  Password: {}",
            if self.password.is_empty() {
                "[empty]"
            } else {
                "[set]"
            }
        );
        match &self.wallet {
            Some(wallet) => info!("  Wallet: {}", wallet.dir.display()),
            None => info!("  Wallet: [none]"),
        }
    }
}

impl fmt::Debug for DbSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbSettings")
            .field("user", &self.user)
            .field("password", &"[hidden]")
            .field("dsn", &self.dsn)
            .field("wallet", &self.wallet.as_ref().map(|w| w.dir.clone()))
            .finish()
    }
}

/// Table and columns the UPDATE statement is templated with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTable {
    pub table: String,
    pub vector_column: String,
    pub key_column: String,
}

impl TargetTable {
    pub fn new(
        table: impl Into<String>,
        vector_column: impl Into<String>,
        key_column: impl Into<String>,
    ) -> ExportResult<Self> {
        let target = Self {
            table: table.into(),
            vector_column: vector_column.into(),
            key_column: key_column.into(),
        };

        if !target.table.split('.').all(is_sql_identifier) || target.table.split('.').count() > 2
        {
            return Err(ExportError::Config(format!(
                "invalid table name '{}'",
                target.table
            )));
        }
        for column in [&target.vector_column, &target.key_column] {
            if !is_sql_identifier(column) {
                return Err(ExportError::Config(format!(
                    "invalid column name '{}'",
                    column
                )));
            }
        }
        Ok(target)
    }

    pub fn update_statement(&self) -> String {
        format!(
            "UPDATE {} SET {} = $1 WHERE {} = $2::bigint",
            self.table, self.vector_column, self.key_column
        )
    }
}

impl fmt::Display for TargetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.vector_column)
    }
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Inputs and switches for one export run.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub model_path: PathBuf,
    pub layer: String,
    pub ratings_path: PathBuf,
    pub id_column: String,
    /// Persisted mapping to use instead of re-deriving from the ratings file.
    pub index_map_path: Option<PathBuf>,
    /// Where to save the derived mapping, if anywhere.
    pub write_index_map_path: Option<PathBuf>,
    pub commit_policy: CommitPolicy,
    pub dry_run: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            layer: DEFAULT_EMBEDDING_LAYER.to_string(),
            ratings_path: PathBuf::from(DEFAULT_RATINGS_PATH),
            id_column: DEFAULT_ID_COLUMN.to_string(),
            index_map_path: None,
            write_index_map_path: None,
            commit_policy: CommitPolicy::default(),
            dry_run: false,
        }
    }
}
