use chrono::Utc;
use parking_lot::Mutex;

use super::{run_id_from, MetricsDb, ResultDocument};
use crate::error::FolkError;

/// Keeps stamped result documents in process memory.
///
/// Configured with `TYPE = "memory"`; useful for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryMetricsDb {
    name: String,
    records: Mutex<Vec<ResultDocument>>,
}

impl MemoryMetricsDb {
    /// Creates an empty in-memory db.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Copies of every stored record, in write order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ResultDocument> {
        self.records.lock().clone()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing was written yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Drops every stored record.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl MetricsDb for MemoryMetricsDb {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_experiment_res(
        &self,
        res_doc: &ResultDocument,
        run_id: Option<&str>,
    ) -> Result<(), FolkError> {
        let run_at = Utc::now();
        let run_id = run_id.map_or_else(|| run_id_from(run_at), str::to_owned);
        self.records.lock().push(res_doc.stamped(&run_id, run_at));
        Ok(())
    }
}
