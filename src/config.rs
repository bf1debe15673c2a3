//! Configuration management for the default prediction pipeline

use crate::compressor::OverflowPolicy;
use crate::models::{BoosterParams, ParamOverrides};
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Execution path of a pipeline run.
///
/// Selects where the per-feature compressors come from and how booster
/// parameters are chosen.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Fit compressors from the training data and tune booster parameters
    #[default]
    FitSearch,
    /// Fit compressors and train with the fixed fallback parameters
    FitFixed,
    /// Reuse cached compressors and tune booster parameters
    CachedSearch,
    /// Reuse cached compressors and train with the fixed fallback parameters
    CachedFixed,
}

impl RunMode {
    /// Whether compressors are loaded from the model cache instead of fitted
    pub fn uses_cache(&self) -> bool {
        matches!(self, RunMode::CachedSearch | RunMode::CachedFixed)
    }

    /// Whether booster parameters come from a cross-validated search
    pub fn searches_params(&self) -> bool {
        matches!(self, RunMode::FitSearch | RunMode::CachedSearch)
    }
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub paths: PathsConfig,
    #[serde(default)]
    pub columns: ColumnsConfig,
    #[serde(default)]
    pub preprocessing: PreprocessingConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

/// Input and output file locations
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Raw training observations (one row per customer per statement)
    pub train_data: PathBuf,
    /// Customer id to binary target
    pub train_labels: PathBuf,
    /// Raw test observations; no submission is written when absent
    #[serde(default)]
    pub test_data: Option<PathBuf>,
    /// Submission output (customer id to predicted probability)
    pub submission: PathBuf,
    /// Cache of fitted per-feature compressors
    pub model_cache: PathBuf,
    /// JSON training report
    pub report: PathBuf,
    /// Trained booster; not saved when absent
    #[serde(default)]
    pub booster: Option<PathBuf>,
}

/// Names of the structural columns in the input files
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnsConfig {
    pub customer_id: String,
    pub date: String,
    pub label: String,
    /// chrono format string of the date column
    pub date_format: String,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            customer_id: "customer_ID".to_string(),
            date: "S_2".to_string(),
            label: "target".to_string(),
            date_format: "%Y-%m-%d".to_string(),
        }
    }
}

/// Column allow/deny lists applied while cleaning
#[derive(Debug, Clone, Deserialize)]
pub struct PreprocessingConfig {
    /// Columns one-hot encoded into `<column>_<value>` indicators
    pub categorical_columns: Vec<String>,
    /// Low-value columns removed when present
    pub drop_columns: Vec<String>,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            categorical_columns: default_categorical_columns(),
            drop_columns: default_drop_columns(),
        }
    }
}

fn default_categorical_columns() -> Vec<String> {
    [
        "D_63", "D_64", "B_30", "B_38", "D_114", "D_116", "D_117", "D_120", "D_126", "D_66",
        "D_68",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

fn default_drop_columns() -> Vec<String> {
    [
        "S_2", "D_73", "D_87", "D_88", "D_108", "D_110", "D_111", "B_39", "B_42",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

/// Time-series compression settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CompressionConfig {
    /// Fixed number of statements per customer after padding
    pub sequence_length: usize,
    /// What to do with customers that have more statements than that
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            sequence_length: 13,
            overflow: OverflowPolicy::KeepLatest,
        }
    }
}

/// Run mode selection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub mode: RunMode,
}

/// Booster parameters: the base set and the fixed fallback overrides
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub base: BoosterParams,
    /// Overrides used when no parameter search runs
    #[serde(default = "default_fixed_params")]
    pub fixed_params: ParamOverrides,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base: BoosterParams::default(),
            fixed_params: default_fixed_params(),
        }
    }
}

/// Best parameters found by an earlier search (validation score 0.742)
fn default_fixed_params() -> ParamOverrides {
    ParamOverrides {
        lambda_l1: Some(1.422_681_905_388_840_3e-6),
        lambda_l2: Some(1.995_693_360_681_555_3e-7),
        num_leaves: Some(256),
        feature_fraction: Some(0.4),
        bagging_fraction: Some(0.444_428_221_470_081_15),
        bagging_freq: Some(5),
        min_child_samples: Some(50),
        num_iterations: Some(1000),
        ..ParamOverrides::default()
    }
}

/// Final model training settings
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Fraction of customers held out for validation
    pub test_size: f64,
    /// Seed of the train/validation shuffle
    pub random_state: u64,
    /// Keep the class ratio equal in both halves of the split
    #[serde(default)]
    pub stratify: bool,
    pub num_boost_round: usize,
    /// Rounds without validation improvement before stopping (0 = never stop)
    pub early_stopping_rounds: usize,
    /// Log validation scores every N rounds (0 = silent)
    #[serde(default)]
    pub log_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            random_state: 0,
            stratify: false,
            num_boost_round: 1000,
            early_stopping_rounds: 100,
            log_every: 0,
        }
    }
}

/// Cross-validated parameter search settings
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub n_folds: usize,
    pub num_boost_round: usize,
    pub early_stopping_rounds: usize,
    /// Number of sampled (lambda_l1, lambda_l2) pairs
    pub regularization_trials: usize,
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_folds: 3,
            num_boost_round: 500,
            early_stopping_rounds: 50,
            regularization_trials: 20,
            seed: 0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Text summary settings
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// Buckets of the validation prediction histogram
    pub histogram_bins: usize,
    /// Features listed in the importance ranking
    pub top_features: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            histogram_bins: 20,
            top_features: 25,
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, overlaid by `PIPELINE__*`
    /// environment variables
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("PIPELINE").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Base booster parameters with the round budget of the final training
    pub fn training_params(&self) -> BoosterParams {
        BoosterParams {
            num_iterations: self.training.num_boost_round,
            ..self.model.base.clone()
        }
    }

    /// Base booster parameters with the round budget of the search
    pub fn search_params(&self) -> BoosterParams {
        BoosterParams {
            num_iterations: self.search.num_boost_round,
            ..self.model.base.clone()
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig {
                train_data: PathBuf::from("data/train_data.csv"),
                train_labels: PathBuf::from("data/train_labels.csv"),
                test_data: None,
                submission: PathBuf::from("data/result_submission.csv"),
                model_cache: PathBuf::from("data/model_score.json"),
                report: PathBuf::from("data/training_report.json"),
                booster: None,
            },
            columns: ColumnsConfig::default(),
            preprocessing: PreprocessingConfig::default(),
            compression: CompressionConfig::default(),
            run: RunConfig::default(),
            model: ModelConfig::default(),
            training: TrainingConfig::default(),
            search: SearchConfig::default(),
            logging: LoggingConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.columns.customer_id, "customer_ID");
        assert_eq!(config.compression.sequence_length, 13);
        assert_eq!(config.training.test_size, 0.2);
        assert_eq!(config.training.random_state, 0);
        assert_eq!(config.preprocessing.categorical_columns.len(), 11);
        assert_eq!(config.preprocessing.drop_columns.len(), 9);
        assert_eq!(config.run.mode, RunMode::FitSearch);
    }

    #[test]
    fn test_fixed_params() {
        let fixed = default_fixed_params();
        assert_eq!(fixed.num_leaves, Some(256));
        assert_eq!(fixed.min_child_samples, Some(50));
        assert_eq!(fixed.num_iterations, Some(1000));
        assert!(fixed.learning_rate.is_none());
    }

    #[test]
    fn test_run_mode_paths() {
        let modes = [
            (RunMode::FitSearch, false, true),
            (RunMode::FitFixed, false, false),
            (RunMode::CachedSearch, true, true),
            (RunMode::CachedFixed, true, false),
        ];
        for (mode, cache, search) in modes {
            assert_eq!(mode.uses_cache(), cache, "{:?}", mode);
            assert_eq!(mode.searches_params(), search, "{:?}", mode);
        }
    }

    #[test]
    fn test_round_budgets() {
        let config = AppConfig::default();
        assert_eq!(config.training_params().num_iterations, 1000);
        assert_eq!(config.search_params().num_iterations, 500);
        assert_eq!(
            config.training_params().learning_rate,
            config.model.base.learning_rate
        );
    }

    #[test]
    fn test_load_from_path() {
        let dir = std::env::temp_dir().join(format!("pipeline-config-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        fs::write(
            &path,
            r#"
[paths]
train_data = "in/train.csv"
train_labels = "in/labels.csv"
submission = "out/submission.csv"
model_cache = "out/cache.json"
report = "out/report.json"

[run]
mode = "cached-fixed"

[compression]
sequence_length = 6
overflow = "reject"

[model.base]
learning_rate = 0.1
"#,
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.run.mode, RunMode::CachedFixed);
        assert_eq!(config.compression.sequence_length, 6);
        assert_eq!(config.compression.overflow, OverflowPolicy::Reject);
        assert_eq!(config.model.base.learning_rate, 0.1);
        assert_eq!(config.model.base.max_bin, 255);
        assert!(config.paths.test_data.is_none());
        assert_eq!(config.training.early_stopping_rounds, 100);

        fs::remove_dir_all(&dir).unwrap();
    }
}
