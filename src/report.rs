//! Training report and its text summary

use crate::config::RunMode;
use crate::models::{BoosterParams, FeatureImportance};
use anyhow::{ensure, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Width of a full bar in the text charts
const BAR_WIDTH: usize = 40;

/// Share of one feature's sequence variance kept by its compressed score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVariance {
    pub feature: String,
    pub ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Equal-width histogram of probabilities over [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub bins: Vec<HistogramBin>,
}

impl Histogram {
    pub fn from_predictions(predictions: &[f64], n_bins: usize) -> Result<Self> {
        ensure!(n_bins > 0, "Histogram needs at least one bin");
        let width = 1.0 / n_bins as f64;
        let mut bins: Vec<HistogramBin> = (0..n_bins)
            .map(|i| HistogramBin {
                lower: i as f64 * width,
                upper: (i + 1) as f64 * width,
                count: 0,
            })
            .collect();

        for &p in predictions {
            let idx = ((p.clamp(0.0, 1.0) / width) as usize).min(n_bins - 1);
            bins[idx].count += 1;
        }

        Ok(Self { bins })
    }

    pub fn total(&self) -> usize {
        self.bins.iter().map(|b| b.count).sum()
    }
}

/// Everything a run produced, written as JSON next to the model cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub run_mode: RunMode,
    /// Parameters of the final booster
    pub params: BoosterParams,
    /// Mean CV score of the chosen parameters, when a search ran
    pub search_score: Option<f64>,
    pub best_iteration: Option<usize>,
    pub valid_logloss: f64,
    /// Amex metric on the validation set
    pub valid_score: f64,
    pub n_train: usize,
    pub n_valid: usize,
    /// Customers scored for the submission, when test data was given
    pub n_test: Option<usize>,
    pub explained_variance: Vec<FeatureVariance>,
    pub feature_importance: Vec<FeatureImportance>,
    pub prediction_histogram: Histogram,
}

impl TrainingReport {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create report {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .with_context(|| format!("Failed to write report {}", path.display()))
    }

    /// Text summary: headline scores, explained variance per feature,
    /// prediction histogram and the `top_features` most used features
    pub fn render_summary(&self, top_features: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let rule = "═".repeat(62);

        lines.push(format!("╔{}╗", rule));
        lines.push("║          DEFAULT PREDICTION PIPELINE - TRAINING SUMMARY      ║".to_string());
        lines.push(format!("╠{}╣", rule));
        lines.push(format!("║ Run: {}  Mode: {:?}", self.run_id, self.run_mode));
        lines.push(format!(
            "║ Customers: train={:>8}  valid={:>8}  test={:>8}",
            self.n_train,
            self.n_valid,
            self.n_test.map_or_else(|| "-".to_string(), |n| n.to_string())
        ));
        lines.push(format!(
            "║ Validation: amex={:>7.4}  logloss={:>7.4}  best_iteration={}",
            self.valid_score,
            self.valid_logloss,
            self.best_iteration
                .map_or_else(|| "-".to_string(), |n| n.to_string())
        ));
        if let Some(score) = self.search_score {
            lines.push(format!("║ Search CV score: {:>7.4}", score));
        }
        lines.push(format!(
            "║ Elapsed: {:.1}s",
            (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
        ));

        lines.push(format!("╠{}╣", rule));
        lines.push("║ Explained Variance Ratio:".to_string());
        for entry in &self.explained_variance {
            lines.push(format!(
                "║   {:<14} {:>6.3} {}",
                entry.feature,
                entry.ratio,
                bar(entry.ratio)
            ));
        }

        lines.push(format!("╠{}╣", rule));
        lines.push("║ Validation Prediction Distribution:".to_string());
        let total = self.prediction_histogram.total();
        for b in &self.prediction_histogram.bins {
            let share = if total > 0 { b.count as f64 / total as f64 } else { 0.0 };
            lines.push(format!(
                "║   {:.2}-{:.2}: {:>7} ({:>5.1}%) {}",
                b.lower,
                b.upper,
                b.count,
                share * 100.0,
                bar(share)
            ));
        }

        lines.push(format!("╠{}╣", rule));
        lines.push("║ Feature Importance (splits):".to_string());
        let mut ranked: Vec<&FeatureImportance> = self.feature_importance.iter().collect();
        ranked.sort_by(|a, b| b.splits.cmp(&a.splits).then(b.gain.total_cmp(&a.gain)));
        let max_splits = ranked.first().map_or(0, |f| f.splits).max(1);
        for f in ranked.into_iter().take(top_features) {
            lines.push(format!(
                "║   {:<20} {:>7} {}",
                f.feature,
                f.splits,
                bar(f.splits as f64 / max_splits as f64)
            ));
        }
        lines.push(format!("╚{}╝", rule));

        lines
    }

    pub fn print_summary(&self, top_features: usize) {
        for line in self.render_summary(top_features) {
            info!("{}", line);
        }
    }
}

fn bar(share: f64) -> String {
    "█".repeat((share.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> TrainingReport {
        let now = Utc::now();
        TrainingReport {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            run_mode: RunMode::FitFixed,
            params: BoosterParams::default(),
            search_score: None,
            best_iteration: Some(12),
            valid_logloss: 0.31,
            valid_score: 0.74,
            n_train: 80,
            n_valid: 20,
            n_test: None,
            explained_variance: vec![
                FeatureVariance { feature: "P_2".to_string(), ratio: 0.9 },
                FeatureVariance { feature: "B_1".to_string(), ratio: 0.4 },
            ],
            feature_importance: vec![
                FeatureImportance { feature: "PA_B_1".to_string(), splits: 3, gain: 1.0 },
                FeatureImportance { feature: "PA_P_2".to_string(), splits: 10, gain: 5.0 },
            ],
            prediction_histogram: Histogram::from_predictions(&[0.05, 0.5, 0.95, 1.0], 4).unwrap(),
        }
    }

    #[test]
    fn test_histogram_counts() {
        let h = Histogram::from_predictions(&[0.0, 0.1, 0.49, 0.5, 0.99, 1.0], 2).unwrap();
        assert_eq!(h.bins.len(), 2);
        assert_eq!(h.bins[0].count, 3);
        assert_eq!(h.bins[1].count, 3);
        assert_eq!(h.total(), 6);
        assert!(Histogram::from_predictions(&[0.5], 0).is_err());
    }

    #[test]
    fn test_summary_ranks_importance() {
        let lines = report().render_summary(1);
        let importance_at = lines
            .iter()
            .position(|l| l.contains("Feature Importance"))
            .unwrap();
        assert!(lines[importance_at + 1].contains("PA_P_2"));
        assert!(!lines.iter().any(|l| l.contains("PA_B_1")));
        assert!(lines.iter().any(|l| l.contains("amex= 0.7400")));
        assert!(lines[0].starts_with('╔'));
        assert!(lines.last().unwrap().starts_with('╚'));
    }

    #[test]
    fn test_save_writes_json() {
        let dir = std::env::temp_dir().join(format!("pipeline-report-{}", Uuid::new_v4()));
        let path = dir.join("nested").join("report.json");
        let report = report();
        report.save(&path).unwrap();

        let loaded: TrainingReport =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.run_id, report.run_id);
        assert_eq!(loaded.run_mode, RunMode::FitFixed);
        assert_eq!(loaded.prediction_histogram, report.prediction_histogram);

        fs::remove_dir_all(&dir).unwrap();
    }
}
