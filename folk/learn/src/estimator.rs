use std::cmp::Ordering;

use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::{error::LearnError, frame::Cell};

/// A trainable classifier over a numeric feature matrix and encoded class labels.
///
/// Cross-validation clones an unfitted estimator once per fold, hence `Clone`;
/// folds may be evaluated on worker threads, hence `Send + Sync`.
pub trait Classifier: Clone + Send + Sync {
    /// Fits the model. Labels are class indices below `n_classes`.
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<(), LearnError>;

    /// Predicts a class index per row.
    fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>, LearnError>;
}

/// Weight regularization applied by [`LogisticRegression`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Penalty {
    /// Lasso (soft-thresholded weights).
    L1,
    /// Ridge.
    L2,
}

#[derive(Debug, Clone)]
struct Fitted {
    means: Array1<f64>,
    scales: Array1<f64>,
    weights: Array2<f64>,
    intercept: Array1<f64>,
}

impl Fitted {
    fn standardize(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.means) / &self.scales
    }
}

/// Multinomial logistic regression trained by full-batch gradient descent.
///
/// Features are standardized with the training statistics. `c` is the inverse
/// regularization strength: smaller values regularize more.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    penalty: Penalty,
    c: f64,
    max_iter: usize,
    learning_rate: f64,
    fitted: Option<Fitted>,
}

impl LogisticRegression {
    /// Creates an unfitted model.
    #[must_use]
    pub const fn new(penalty: Penalty, c: f64) -> Self {
        Self {
            penalty,
            c,
            max_iter: 200,
            learning_rate: 0.5,
            fitted: None,
        }
    }

    /// Sets the number of gradient steps.
    #[must_use]
    pub const fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Sets the gradient step size.
    #[must_use]
    pub const fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Configured penalty.
    #[must_use]
    pub const fn penalty(&self) -> Penalty {
        self.penalty
    }

    /// Configured inverse regularization strength.
    #[must_use]
    pub const fn c(&self) -> f64 {
        self.c
    }

    /// Whether [`Classifier::fit`] has completed.
    #[must_use]
    pub const fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }
}

impl Classifier for LogisticRegression {
    #[allow(clippy::cast_precision_loss)]
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], n_classes: usize) -> Result<(), LearnError> {
        let (n_samples, n_features) = x.dim();
        if n_samples != y.len() {
            return Err(LearnError::LengthMismatch {
                features: n_samples,
                labels: y.len(),
            });
        }
        if n_samples == 0 {
            return Err(LearnError::EmptyInput);
        }
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(LearnError::InvalidParameter(format!(
                "C must be positive, got {}",
                self.c
            )));
        }
        let mut onehot = Array2::<f64>::zeros((n_samples, n_classes));
        for (row, &class) in y.iter().enumerate() {
            if class >= n_classes {
                return Err(LearnError::UnknownLabel(class.to_string()));
            }
            onehot[[row, class]] = 1.0;
        }

        let means = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        let scales = x
            .std_axis(Axis(0), 0.0)
            .mapv(|scale| if scale > 1e-12 { scale } else { 1.0 });
        let xs = (x - &means) / &scales;

        let n = n_samples as f64;
        let reg = 1.0 / (self.c * n);
        let mut weights = Array2::<f64>::zeros((n_features, n_classes));
        let mut intercept = Array1::<f64>::zeros(n_classes);
        for _ in 0..self.max_iter {
            let residual = softmax(xs.dot(&weights) + &intercept) - &onehot;
            let mut grad_w = xs.t().dot(&residual) / n;
            let grad_b = residual.sum_axis(Axis(0)) / n;
            if self.penalty == Penalty::L2 {
                grad_w.scaled_add(reg, &weights);
            }
            weights.scaled_add(-self.learning_rate, &grad_w);
            intercept.scaled_add(-self.learning_rate, &grad_b);
            if self.penalty == Penalty::L1 {
                let threshold = self.learning_rate * reg;
                weights.mapv_inplace(|w| w.signum() * (w.abs() - threshold).max(0.0));
            }
        }

        self.fitted = Some(Fitted {
            means,
            scales,
            weights,
            intercept,
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>, LearnError> {
        let fitted = self.fitted.as_ref().ok_or(LearnError::NotFitted)?;
        if x.ncols() != fitted.means.len() {
            return Err(LearnError::FeatureMismatch {
                expected: fitted.means.len(),
                found: x.ncols(),
            });
        }
        let scores = fitted.standardize(x).dot(&fitted.weights) + &fitted.intercept;
        Ok(scores.rows().into_iter().map(argmax).collect())
    }
}

fn softmax(mut logits: Array2<f64>) -> Array2<f64> {
    for mut row in logits.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |acc, &value| acc.max(value));
        row.mapv_inplace(|value| (value - max).exp());
        let sum = row.sum();
        row /= sum;
    }
    logits
}

fn argmax(row: ArrayView1<'_, f64>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (idx, &value)| {
            if value > best.1 {
                (idx, value)
            } else {
                best
            }
        })
        .0
}

/// Maps label cells to class indices.
///
/// Classes are compared by type first, so `1`, `1.0` and `"1"` stay distinct;
/// within a type they sort by value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelEncoder {
    classes: Vec<Cell>,
}

impl LabelEncoder {
    /// Learns the distinct classes of `labels`.
    #[must_use]
    pub fn fit(labels: &[Cell]) -> Self {
        let mut classes = labels.to_vec();
        classes.sort_by(class_order);
        classes.dedup_by(|a, b| class_order(a, b) == Ordering::Equal);
        Self { classes }
    }

    /// Known classes in index order.
    #[must_use]
    pub fn classes(&self) -> &[Cell] {
        &self.classes
    }

    /// Number of distinct classes.
    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Encodes labels as class indices.
    pub fn transform(&self, labels: &[Cell]) -> Result<Vec<usize>, LearnError> {
        labels
            .iter()
            .map(|label| {
                self.classes
                    .binary_search_by(|class| class_order(class, label))
                    .map_err(|_| LearnError::UnknownLabel(label.to_string()))
            })
            .collect()
    }
}

const fn type_rank(cell: &Cell) -> u8 {
    match cell {
        Cell::Null => 0,
        Cell::Bool(_) => 1,
        Cell::Int(_) => 2,
        Cell::Float(_) => 3,
        Cell::Text(_) => 4,
    }
}

fn class_order(left: &Cell, right: &Cell) -> Ordering {
    match (left, right) {
        (Cell::Bool(a), Cell::Bool(b)) => a.cmp(b),
        (Cell::Int(a), Cell::Int(b)) => a.cmp(b),
        (Cell::Float(a), Cell::Float(b)) => a.total_cmp(b),
        (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}
