use folk_learn::LearnError;
use thiserror::Error;

/// Errors raised by folk configuration, metric databases and the evaluation driver.
#[derive(Debug, Error)]
pub enum FolkError {
    /// A required field of a metric db block is absent.
    #[error("missing config value for {key} for {kind}-based {db} folk metrics db")]
    MissingConfigValue {
        /// Missing key.
        key: &'static str,
        /// Backend kind being configured.
        kind: &'static str,
        /// Configured db name.
        db: String,
    },
    /// A db is listed in `METRIC_DB_NAMES` without a block under `METRIC_DBS`.
    #[error("no configuration for db {0} included in METRIC_DBS")]
    MissingDbBlock(String),
    /// A db block has no `TYPE`.
    #[error("no type configured for db {0}")]
    MissingDbType(String),
    /// A db block names a backend that does not exist.
    #[error("unknown type `{kind}` configured for db {db}")]
    UnknownDbType {
        /// Configured db name.
        db: String,
        /// The unrecognized type string.
        kind: String,
    },
    /// Pipeline params must name the label column under `lbl_col`.
    #[error("pipeline params {0} do not name a label column under `lbl_col`")]
    MissingLabelColumn(String),
    /// A configuration source could not be read or parsed.
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    /// MongoDB driver failure.
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    /// Dataframe, estimator or cross-validation failure.
    #[error(transparent)]
    Learn(#[from] LearnError),
}
