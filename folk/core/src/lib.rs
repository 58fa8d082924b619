#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Folksy experiment management for machine learning.
//!
//! Pipelines and models are described as factories over parameter grids; the
//! evaluation driver cross-validates every combination and writes one result
//! document per model variant to a configured metrics db.

/// Configuration loading: an optional `cfg` file (any format the `config`
/// crate detects by extension) in the folk config directory, overlaid with
/// `FOLK_`-prefixed environment variables. Nested keys are addressed with
/// `__`, so `FOLK_METRIC_DBS__PROD__URI` sets `METRIC_DBS.PROD.URI`. Keys
/// match case-insensitively.
pub mod cfg;
/// Error type shared by the crate.
pub mod error;
/// Evaluation driver: cross-validates every model variant against every
/// pipeline variant and hands the results to a metrics db.
pub mod evaluate;
/// Metric databases and the registry that routes result documents to them.
pub mod metricsdb;
/// Parameterized models.
pub mod model;
/// Parameterized pipelines.
pub mod pipe;
/// Telemetry helpers for structured run logs.
pub mod telemetry;
#[cfg(test)]
mod testing;

pub use cfg::{CfgKey, FolkConfig};
pub use error::FolkError;
pub use evaluate::{eval_param_pipeline_n_model, EvalOptions, EvaluationReport};
pub use folk_grid::{Assignment, ConstrainedGrid, ParamGrid, ParameterGrid};
pub use metricsdb::{
    MemoryMetricsDb, MetricKey, MetricsDb, MetricsDbKind, MetricsRegistry, MongoMetricsDb,
    ResultDocument, WriteOutcome,
};
pub use model::{default_model_id, ConstrainedParameterizedModel, ParameterizedModel};
pub use pipe::ParameterizedPipeline;
pub use telemetry::{FolkTelemetry, FolkTelemetryBuilder};
