#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Tabular data, pipeline stages, classifiers and cross-validation for folk experiments.

/// Error type shared by the crate.
pub mod error;
/// Column-oriented dataframe.
pub mod frame;
/// Composable dataframe transforms. Each stage fits and transforms in the
/// same call; there is no separate fit phase.
pub mod pipeline;
/// Classifier contract and implementations.
pub mod estimator;
/// Scoring functions.
pub mod metrics;
/// Fold splitting and cross-validation.
pub mod model_selection;

pub use error::LearnError;
pub use estimator::{Classifier, LabelEncoder, LogisticRegression, Penalty};
pub use frame::{Cell, DataFrame};
pub use metrics::accuracy_score;
pub use model_selection::{cross_val_score, CrossValScores, StratifiedKFold};
pub use pipeline::{ApplyByCols, ColDrop, ColRename, Pipeline, Transform};
