use indexmap::IndexMap;
use ndarray::{Array2, Axis};
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;

use crate::{error::LearnError, estimator::Classifier, metrics::accuracy_score};

/// Train/test index pair for one fold.
pub type Split = (Vec<usize>, Vec<usize>);

/// Per-fold scores of a cross-validation run.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossValScores {
    /// Score of each fold, in fold order.
    pub scores: Vec<f64>,
}

impl CrossValScores {
    /// Mean score.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> f64 {
        if self.scores.is_empty() {
            return 0.0;
        }
        self.scores.iter().sum::<f64>() / self.scores.len() as f64
    }

    /// Population standard deviation of the scores.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn std(&self) -> f64 {
        if self.scores.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self
            .scores
            .iter()
            .map(|score| (score - mean).powi(2))
            .sum::<f64>()
            / self.scores.len() as f64;
        variance.sqrt()
    }
}

/// K-fold splitter that preserves class proportions across folds.
///
/// Samples of each class are dealt to folds in turn, continuing the rotation
/// from one class to the next, so fold sizes differ by at most one.
#[derive(Debug, Clone)]
pub struct StratifiedKFold {
    n_splits: usize,
    random_state: Option<u64>,
}

impl StratifiedKFold {
    /// Creates a splitter without shuffling.
    #[must_use]
    pub const fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            random_state: None,
        }
    }

    /// Shuffles samples within each class using a seeded generator.
    #[must_use]
    pub const fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Number of folds.
    #[must_use]
    pub const fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Generates train/test indices for each fold.
    pub fn split(&self, y: &[usize]) -> Result<Vec<Split>, LearnError> {
        let samples = y.len();
        if self.n_splits < 2 || self.n_splits > samples {
            return Err(LearnError::InvalidFolds {
                folds: self.n_splits,
                samples,
            });
        }
        let mut by_class: IndexMap<usize, Vec<usize>> = IndexMap::new();
        for (idx, &class) in y.iter().enumerate() {
            by_class.entry(class).or_default().push(idx);
        }
        by_class.sort_keys();
        if let Some(seed) = self.random_state {
            let mut rng = SmallRng::seed_from_u64(seed);
            for members in by_class.values_mut() {
                members.shuffle(&mut rng);
            }
        }

        let mut fold_of = vec![0; samples];
        for (turn, &idx) in by_class.values().flatten().enumerate() {
            fold_of[idx] = turn % self.n_splits;
        }
        Ok((0..self.n_splits)
            .map(|fold| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..samples).partition(|&idx| fold_of[idx] == fold);
                (train, test)
            })
            .collect())
    }
}

/// Cross-validates `estimator` and scores every fold by accuracy.
///
/// Each fold trains a fresh clone of the (unfitted) estimator. With `n_jobs == 1`
/// folds run in order on the calling thread; otherwise they run on a dedicated
/// pool of `n_jobs` threads (`0` lets the pool pick one thread per core).
pub fn cross_val_score<C: Classifier>(
    estimator: &C,
    x: &Array2<f64>,
    y: &[usize],
    n_classes: usize,
    cv: &StratifiedKFold,
    n_jobs: usize,
) -> Result<CrossValScores, LearnError> {
    if x.nrows() != y.len() {
        return Err(LearnError::LengthMismatch {
            features: x.nrows(),
            labels: y.len(),
        });
    }
    let splits = cv.split(y)?;
    let run_fold = |(train, test): &Split| -> Result<f64, LearnError> {
        let mut model = estimator.clone();
        let y_train: Vec<usize> = train.iter().map(|&idx| y[idx]).collect();
        let y_test: Vec<usize> = test.iter().map(|&idx| y[idx]).collect();
        model.fit(&x.select(Axis(0), train), &y_train, n_classes)?;
        let predicted = model.predict(&x.select(Axis(0), test))?;
        Ok(accuracy_score(&y_test, &predicted))
    };

    let scores = if n_jobs == 1 {
        splits.iter().map(run_fold).collect::<Result<Vec<_>, _>>()?
    } else {
        tracing::debug!(n_jobs, folds = splits.len(), "cross-validating folds in parallel");
        let pool = rayon::ThreadPoolBuilder::new().num_threads(n_jobs).build()?;
        pool.install(|| {
            splits
                .par_iter()
                .map(run_fold)
                .collect::<Result<Vec<_>, _>>()
        })?
    };
    Ok(CrossValScores { scores })
}
