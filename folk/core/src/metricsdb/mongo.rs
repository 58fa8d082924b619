use std::fmt;

use chrono::{DateTime, Utc};
use mongodb::{
    bson::{self, Bson, Document},
    sync::{Client, Collection},
};
use once_cell::sync::OnceCell;
use serde_json::{Map, Value};

use super::{run_id_from, MetricKey, MetricsDb, ResultDocument};
use crate::error::FolkError;

/// A MongoDB-backed metrics db: one inserted record per result document.
///
/// The client and collection are opened on the first write and reused after.
pub struct MongoMetricsDb {
    name: String,
    uri: String,
    db_name: String,
    collection_name: String,
    collection: OnceCell<Collection<Document>>,
}

impl MongoMetricsDb {
    /// Connection string key of a db block.
    pub const URI: &'static str = "URI";
    /// Database name key of a db block.
    pub const DB_NAME: &'static str = "DB_NAME";
    /// Collection name key of a db block.
    pub const COLLECTION_NAME: &'static str = "COLLECTION_NAME";
    const KIND: &'static str = "MongoDB";

    /// Creates an unconnected db.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        uri: impl Into<String>,
        db_name: impl Into<String>,
        collection_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            db_name: db_name.into(),
            collection_name: collection_name.into(),
            collection: OnceCell::new(),
        }
    }

    /// Builds the db from its configuration block; every connection field is required.
    pub fn from_block(name: &str, block: &Map<String, Value>) -> Result<Self, FolkError> {
        let field = |key: &'static str| {
            block
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| FolkError::MissingConfigValue {
                    key,
                    kind: Self::KIND,
                    db: name.to_owned(),
                })
        };
        Ok(Self::new(
            name,
            field(Self::URI)?,
            field(Self::DB_NAME)?,
            field(Self::COLLECTION_NAME)?,
        ))
    }

    /// Database name records go to.
    #[must_use]
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Collection name records go to.
    #[must_use]
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Whether the collection handle has been opened.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.collection.get().is_some()
    }

    fn collection(&self) -> Result<&Collection<Document>, FolkError> {
        self.collection
            .get_or_try_init(|| -> Result<_, FolkError> {
                tracing::debug!(db = %self.name, "opening mongodb collection");
                let client = Client::with_uri_str(&self.uri)?;
                Ok(client
                    .database(&self.db_name)
                    .collection::<Document>(&self.collection_name))
            })
    }
}

impl fmt::Debug for MongoMetricsDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoMetricsDb")
            .field("name", &self.name)
            .field("db_name", &self.db_name)
            .field("collection_name", &self.collection_name)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl MetricsDb for MongoMetricsDb {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_experiment_res(
        &self,
        res_doc: &ResultDocument,
        run_id: Option<&str>,
    ) -> Result<(), FolkError> {
        let record = build_record(res_doc, run_id, Utc::now());
        self.collection()?.insert_one(record).run()?;
        Ok(())
    }
}

/// Builds the inserted record: `run_id` (generated from `run_at` when absent)
/// and `run_at` first, then the document's own entries, which win on collision.
fn build_record(res_doc: &ResultDocument, run_id: Option<&str>, run_at: DateTime<Utc>) -> Document {
    let run_id = run_id.map_or_else(|| run_id_from(run_at), str::to_owned);
    let mut record = Document::new();
    record.insert(MetricKey::RUN_ID, run_id);
    record.insert(
        MetricKey::RUN_AT,
        Bson::DateTime(bson::DateTime::from_millis(run_at.timestamp_millis())),
    );
    for (key, value) in res_doc.iter() {
        record.insert(key.clone(), to_bson(value));
    }
    record
}

/// Converts a JSON value to BSON. Unsigned integers beyond `i64::MAX` have no
/// BSON integer type and are stored as doubles.
#[allow(clippy::cast_precision_loss)]
fn to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(flag) => Bson::Boolean(*flag),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                Bson::Int64(int)
            } else if let Some(big) = number.as_u64() {
                Bson::Double(big as f64)
            } else {
                Bson::Double(number.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(text) => Bson::String(text.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(to_bson).collect()),
        Value::Object(fields) => Bson::Document(
            fields
                .iter()
                .map(|(key, field)| (key.clone(), to_bson(field)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn block(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn builds_from_complete_block_without_connecting() {
        let db = MongoMetricsDb::from_block(
            "FOLK_TEST",
            &block(json!({
                "TYPE": "mongodb",
                "URI": "mongodb://localhost:27017",
                "DB_NAME": "folk",
                "COLLECTION_NAME": "metrics",
            })),
        )
        .unwrap();
        assert_eq!(db.name(), "FOLK_TEST");
        assert_eq!(db.db_name(), "folk");
        assert_eq!(db.collection_name(), "metrics");
        assert!(!db.is_connected());
    }

    #[test]
    fn missing_fields_fail_construction() {
        let err = MongoMetricsDb::from_block(
            "FOLK_TEST",
            &block(json!({ "TYPE": "mongodb", "URI": "mongodb://localhost:27017" })),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            FolkError::MissingConfigValue { key: "DB_NAME", .. }
        ));
        assert!(err.to_string().contains("FOLK_TEST"));
    }

    #[test]
    fn records_lead_with_run_fields() {
        let at = Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap();
        let doc = ResultDocument::new()
            .with(MetricKey::MODEL_ID, "C=0.3_penalty=l1")
            .with(MetricKey::ACC_MEAN, 0.5)
            .with(MetricKey::N_FOLDS, 2);
        let record = build_record(&doc, Some("42"), at);
        let keys: Vec<_> = record.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            ["run_id", "run_at", "model_identifier", "accuracy_mean", "n_folds"]
        );
        assert_eq!(record.get_str(MetricKey::RUN_ID).unwrap(), "42");
        assert_eq!(
            record.get_datetime(MetricKey::RUN_AT).unwrap().timestamp_millis(),
            1_700_000_000_250
        );
        assert_eq!(record.get_i64(MetricKey::N_FOLDS).unwrap(), 2);
        assert!((record.get_f64(MetricKey::ACC_MEAN).unwrap() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn records_generate_run_ids_and_let_documents_override() {
        let at = Utc.timestamp_opt(1_700_000_000, 1_500_000).unwrap();
        let generated = build_record(&ResultDocument::new(), None, at);
        assert_eq!(generated.get_str(MetricKey::RUN_ID).unwrap(), "1700000000001500");

        let doc = ResultDocument::new().with(MetricKey::RUN_ID, "explicit");
        let overridden = build_record(&doc, Some("ignored"), at);
        assert_eq!(overridden.get_str(MetricKey::RUN_ID).unwrap(), "explicit");
    }

    #[test]
    fn oversized_unsigned_values_become_doubles() {
        let doc = ResultDocument::new()
            .with("seed", u64::MAX)
            .with("grid", json!({ "depth": [1, 2], "lower": true, "tag": null }));
        let record = build_record(&doc, Some("1"), Utc::now());
        assert!(matches!(record.get("seed"), Some(Bson::Double(value)) if *value > 1.8e19));
        let grid = record.get_document("grid").unwrap();
        assert_eq!(
            grid.get_array("depth").unwrap(),
            &vec![Bson::Int64(1), Bson::Int64(2)]
        );
        assert!(grid.get_bool("lower").unwrap());
        assert_eq!(grid.get("tag"), Some(&Bson::Null));
    }
}
