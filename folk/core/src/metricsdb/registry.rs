use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use super::{MemoryMetricsDb, MetricsDb, MetricsDbKind, MongoMetricsDb, ResultDocument};
use crate::{
    cfg::{CfgKey, FolkConfig},
    error::FolkError,
};

/// A listed db that could not be registered, with the reason.
#[derive(Debug)]
pub struct SkippedDb {
    /// Name as listed in `METRIC_DB_NAMES`.
    pub name: String,
    /// Why it was not registered.
    pub reason: FolkError,
}

/// What happened to a result document handed to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The named db persisted the document.
    Written,
    /// No intact db is registered under the name; nothing was written.
    Skipped,
}

/// Metric databases by name.
///
/// Built once from configuration and passed to whoever writes results. Only
/// dbs with an intact configuration are registered; the rest are kept in
/// [`MetricsRegistry::skipped`].
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    dbs: IndexMap<String, Arc<dyn MetricsDb>>,
    skipped: Vec<SkippedDb>,
}

impl MetricsRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every db listed in `METRIC_DB_NAMES` whose block is intact.
    ///
    /// Broken entries are logged and skipped rather than failing the whole load.
    #[must_use]
    pub fn from_config(cfg: &FolkConfig) -> Self {
        let mut registry = Self::new();
        for name in cfg.metric_db_names() {
            match build_db(cfg, &name) {
                Ok(db) => {
                    tracing::debug!(db = %name, "registered folk metrics db");
                    registry.dbs.insert(name, db);
                }
                Err(reason) => {
                    tracing::warn!(db = %name, error = %reason, "skipping folk metrics db");
                    registry.skipped.push(SkippedDb { name, reason });
                }
            }
        }
        registry
    }

    /// Builder-style [`MetricsRegistry::register`].
    #[must_use]
    pub fn with_db(mut self, db: Arc<dyn MetricsDb>) -> Self {
        self.register(db);
        self
    }

    /// Registers a db under its own name, replacing any previous one.
    pub fn register(&mut self, db: Arc<dyn MetricsDb>) {
        self.dbs.insert(db.name().to_owned(), db);
    }

    /// The db registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn MetricsDb>> {
        self.dbs.get(name)
    }

    /// Whether a db is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.dbs.contains_key(name)
    }

    /// Registered names, in configuration order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.dbs.keys().map(String::as_str)
    }

    /// Number of registered dbs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dbs.len()
    }

    /// Whether no db is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dbs.is_empty()
    }

    /// Listed dbs that were not registered.
    #[must_use]
    pub fn skipped(&self) -> &[SkippedDb] {
        &self.skipped
    }

    /// Writes a result document to the db registered under `db_name`.
    ///
    /// An unregistered name is not an error: a warning is logged and
    /// [`WriteOutcome::Skipped`] returned. Failures of a registered db propagate.
    pub fn write_experiment_res(
        &self,
        res_doc: &ResultDocument,
        db_name: &str,
        run_id: Option<&str>,
    ) -> Result<WriteOutcome, FolkError> {
        let Some(db) = self.dbs.get(db_name) else {
            tracing::warn!(
                db = %db_name,
                "no intact configuration for folk metrics db; results were not written"
            );
            return Ok(WriteOutcome::Skipped);
        };
        db.write_experiment_res(res_doc, run_id)?;
        Ok(WriteOutcome::Written)
    }
}

fn build_db(cfg: &FolkConfig, name: &str) -> Result<Arc<dyn MetricsDb>, FolkError> {
    let block = cfg
        .metric_db_block(name)
        .ok_or_else(|| FolkError::MissingDbBlock(name.to_owned()))?;
    let kind = block
        .get(CfgKey::DB_TYPE)
        .and_then(Value::as_str)
        .ok_or_else(|| FolkError::MissingDbType(name.to_owned()))?;
    Ok(match MetricsDbKind::resolve(name, kind)? {
        MetricsDbKind::MongoDb => Arc::new(MongoMetricsDb::from_block(name, block)?),
        MetricsDbKind::Memory => Arc::new(MemoryMetricsDb::new(name)),
    })
}
