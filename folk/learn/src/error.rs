use thiserror::Error;

/// Errors raised by dataframe operations, estimators and cross-validation.
#[derive(Debug, Error)]
pub enum LearnError {
    /// A referenced column does not exist.
    #[error("unknown column `{0}`")]
    UnknownColumn(String),
    /// A column name is used twice.
    #[error("duplicate column `{0}`")]
    DuplicateColumn(String),
    /// A row does not match the column count.
    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        /// Zero-based row index.
        row: usize,
        /// Cells found in the row.
        found: usize,
        /// Number of columns.
        expected: usize,
    },
    /// A feature cell cannot be read as a number.
    #[error("column `{column}` row {row} is not numeric: {value}")]
    NonNumericFeature {
        /// Offending column.
        column: String,
        /// Zero-based row index.
        row: usize,
        /// Rendered cell value.
        value: String,
    },
    /// Features and labels disagree in length.
    #[error("length mismatch: {features} feature rows vs {labels} labels")]
    LengthMismatch {
        /// Number of feature rows.
        features: usize,
        /// Number of labels.
        labels: usize,
    },
    /// The fold count cannot split the samples.
    #[error("cannot split {samples} samples into {folds} folds")]
    InvalidFolds {
        /// Requested folds.
        folds: usize,
        /// Available samples.
        samples: usize,
    },
    /// Fitting was requested on zero samples.
    #[error("cannot fit on an empty training set")]
    EmptyInput,
    /// A hyperparameter is out of range.
    #[error("invalid hyperparameter: {0}")]
    InvalidParameter(String),
    /// Prediction input has a different width than the training data.
    #[error("expected {expected} features, got {found}")]
    FeatureMismatch {
        /// Width seen at fit time.
        expected: usize,
        /// Width of the prediction input.
        found: usize,
    },
    /// A label was not seen when the encoder was built.
    #[error("unknown label `{0}`")]
    UnknownLabel(String),
    /// Prediction was requested before fitting.
    #[error("estimator is not fitted")]
    NotFitted,
    /// The worker pool for parallel folds could not be built.
    #[error("thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
