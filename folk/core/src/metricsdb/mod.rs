use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use folk_grid::Assignment;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FolkError;

/// In-process backend.
pub mod memory;
/// MongoDB backend.
pub mod mongo;
/// Name-to-database registry built from configuration.
pub mod registry;

pub use memory::MemoryMetricsDb;
pub use mongo::MongoMetricsDb;
pub use registry::{MetricsRegistry, SkippedDb, WriteOutcome};

/// Fixed keys of a result document.
#[derive(Debug, Clone, Copy)]
pub struct MetricKey;

impl MetricKey {
    /// Id of the evaluated model variant.
    pub const MODEL_ID: &'static str = "model_identifier";
    /// Id of the evaluation run.
    pub const RUN_ID: &'static str = "run_id";
    /// Time the record was written.
    pub const RUN_AT: &'static str = "run_at";
    /// Label column the model was trained against.
    pub const LBL_COL: &'static str = "lbl_col";
    /// Rows of the processed dataset.
    pub const DATASET_SIZE: &'static str = "dataset_size";
    /// Cross-validation folds.
    pub const N_FOLDS: &'static str = "n_folds";
    /// Cross-validation workers.
    pub const N_JOBS: &'static str = "n_jobs";
    /// Distinct label classes.
    pub const N_CLASS: &'static str = "n_classes";
    /// Mean fold accuracy.
    pub const ACC_MEAN: &'static str = "accuracy_mean";
    /// Standard deviation of fold accuracy.
    pub const ACC_STD: &'static str = "accuracy_std";
    /// Average seconds per fold.
    pub const FOLD_TIME: &'static str = "fold_time";
    /// Seconds spent cross-validating.
    pub const CROSS_VAL_TIME: &'static str = "cv_time";
}

/// Flat record of one cross-validation outcome and the parameters behind it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultDocument(IndexMap<String, Value>);

impl ResultDocument {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts or replaces a value, keeping the position of an existing key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Copies every parameter into the document; parameters win on collision.
    #[must_use]
    pub fn with_params(mut self, params: &Assignment) -> Self {
        for (key, value) in params {
            self.0.insert(key.clone(), value.clone());
        }
        self
    }

    /// Looks up a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Looks up a string value.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Looks up a numeric value.
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the document is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Returns a copy led by `run_id` and `run_at`, with the document's own
    /// entries applied on top.
    #[must_use]
    pub fn stamped(&self, run_id: &str, run_at: DateTime<Utc>) -> Self {
        let mut stamped = Self::new()
            .with(MetricKey::RUN_ID, run_id)
            .with(MetricKey::RUN_AT, run_at.to_rfc3339());
        for (key, value) in self.iter() {
            stamped.0.insert(key.clone(), value.clone());
        }
        stamped
    }
}

/// Run id derived from a timestamp: unix seconds followed by six microsecond digits.
#[must_use]
pub fn run_id_from(at: DateTime<Utc>) -> String {
    format!("{}{:06}", at.timestamp(), at.timestamp_subsec_micros())
}

/// Run id for the current instant.
#[must_use]
pub fn new_run_id() -> String {
    run_id_from(Utc::now())
}

/// A destination for experiment result documents.
pub trait MetricsDb: fmt::Debug + Send + Sync {
    /// Name the db is registered under.
    fn name(&self) -> &str;

    /// Persists one result document, tagged with `run_id` (one is generated
    /// from the current time when absent). Storage failures are returned as is.
    fn write_experiment_res(
        &self,
        res_doc: &ResultDocument,
        run_id: Option<&str>,
    ) -> Result<(), FolkError>;
}

/// Supported metric db backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsDbKind {
    /// [`MongoMetricsDb`].
    MongoDb,
    /// [`MemoryMetricsDb`].
    Memory,
}

impl MetricsDbKind {
    /// Canonical lowercase type string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MongoDb => "mongodb",
            Self::Memory => "memory",
        }
    }

    /// Resolves the `TYPE` of a db block, case-insensitively.
    pub fn resolve(db: &str, kind: &str) -> Result<Self, FolkError> {
        kind.parse().map_err(|()| FolkError::UnknownDbType {
            db: db.to_owned(),
            kind: kind.to_owned(),
        })
    }
}

impl FromStr for MetricsDbKind {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mongodb" => Ok(Self::MongoDb),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

impl fmt::Display for MetricsDbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
