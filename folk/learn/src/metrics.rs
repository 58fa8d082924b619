/// Fraction of predictions equal to the truth. Empty or mismatched inputs score 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn accuracy_score(y_true: &[usize], y_pred: &[usize]) -> f64 {
    if y_true.is_empty() || y_true.len() != y_pred.len() {
        return 0.0;
    }
    let hits = y_true
        .iter()
        .zip(y_pred)
        .filter(|(truth, pred)| truth == pred)
        .count();
    hits as f64 / y_true.len() as f64
}
