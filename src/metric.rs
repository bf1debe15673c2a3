//! Evaluation metrics for default prediction.
//!
//! The competition metric averages a normalized weighted Gini coefficient
//! with the default rate captured in the riskiest 4% of the weighted
//! population. Negatives carry weight 20 and positives weight 1, which
//! undoes the 5% sub-sampling of negatives in the data.

use anyhow::{bail, ensure, Result};

/// Weight of a negative (non-default) record
const NEGATIVE_WEIGHT: f64 = 20.0;

/// Share of cumulative weight treated as "flagged as riskiest"
const TOP_FRACTION: f64 = 0.04;

/// A validation metric reported while boosting
pub trait EvalMetric {
    fn name(&self) -> &str;

    /// Whether larger values mean a better model
    fn higher_is_better(&self) -> bool;

    fn evaluate(&self, y_true: &[f64], y_pred: &[f64]) -> Result<f64>;
}

/// Composite Gini / top-4% capture metric
#[derive(Debug, Clone, Copy, Default)]
pub struct AmexMetric;

impl EvalMetric for AmexMetric {
    fn name(&self) -> &str {
        "amex"
    }

    fn higher_is_better(&self) -> bool {
        true
    }

    fn evaluate(&self, y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
        amex_metric(y_true, y_pred)
    }
}

/// Binary cross-entropy of predicted probabilities
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLoss;

impl EvalMetric for LogLoss {
    fn name(&self) -> &str {
        "binary_logloss"
    }

    fn higher_is_better(&self) -> bool {
        false
    }

    fn evaluate(&self, y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
        log_loss(y_true, y_pred)
    }
}

/// Composite ranking metric: `0.5 * (normalized weighted Gini + top-4% capture)`.
///
/// Records are ranked by descending prediction with a stable sort, so tied
/// predictions keep their input order. Fails on empty or mismatched input
/// and when `y_true` holds only one class.
pub fn amex_metric(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_inputs(y_true, y_pred)?;

    let n_pos: f64 = y_true.iter().sum();
    let n_neg = y_true.len() as f64 - n_pos;
    if n_pos == 0.0 {
        bail!("Metric is undefined without positive labels");
    }
    if n_neg == 0.0 {
        bail!("Metric is undefined without negative labels");
    }

    let mut order: Vec<usize> = (0..y_pred.len()).collect();
    order.sort_by(|&a, &b| y_pred[b].total_cmp(&y_pred[a]));
    let target: Vec<f64> = order.iter().map(|&i| y_true[i]).collect();

    let weight: Vec<f64> = target
        .iter()
        .map(|&t| NEGATIVE_WEIGHT - t * (NEGATIVE_WEIGHT - 1.0))
        .collect();
    let total_weight: f64 = weight.iter().sum();

    let mut cum_norm_weight = Vec::with_capacity(weight.len());
    let mut running = 0.0;
    for w in &weight {
        running += w / total_weight;
        cum_norm_weight.push(running);
    }

    // default rate captured at 4%
    let captured: f64 = target
        .iter()
        .zip(&cum_norm_weight)
        .filter(|(_, &c)| c <= TOP_FRACTION)
        .map(|(&t, _)| t)
        .sum();
    let d = captured / n_pos;

    // weighted gini
    let mut lorentz = 0.0;
    let mut gini = 0.0;
    for ((&t, &c), &w) in target.iter().zip(&cum_norm_weight).zip(&weight) {
        lorentz += t / n_pos;
        gini += (lorentz - c) * w;
    }

    let gini_max = 10.0 * n_neg * (1.0 - 19.0 / (n_pos + 20.0 * n_neg));
    let g = gini / gini_max;

    Ok(0.5 * (g + d))
}

/// Mean binary cross-entropy, with predictions clipped away from 0 and 1
pub fn log_loss(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_inputs(y_true, y_pred)?;
    let eps = 1e-15;
    let total: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(&y, &p)| {
            let p = p.clamp(eps, 1.0 - eps);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    Ok(total / y_true.len() as f64)
}

fn check_inputs(y_true: &[f64], y_pred: &[f64]) -> Result<()> {
    ensure!(!y_true.is_empty(), "Cannot evaluate an empty prediction set");
    ensure!(
        y_true.len() == y_pred.len(),
        "Got {} labels but {} predictions",
        y_true.len(),
        y_pred.len()
    );
    Ok(())
}
