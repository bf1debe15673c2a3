//! End-to-end training run: clean, compress, split, tune, train, score

use crate::compressor::CompressorRegistry;
use crate::config::{AppConfig, RunMode};
use crate::metric::{amex_metric, log_loss, AmexMetric};
use crate::model_selection::{stratified_train_test_split, train_test_split, Split};
use crate::models::{Booster, BoosterParams, TrainData, TrainOptions};
use crate::preprocess::Preprocessor;
use crate::report::{FeatureVariance, Histogram, TrainingReport};
use crate::submission::write_submission;
use crate::tuning::StepwiseTuner;
use crate::types::{CustomerTable, FeatureMatrix, Labels, RawFrame};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

/// Explained-variance ratio below which a compressed feature is reported
const LOW_VARIANCE_RATIO: f64 = 0.2;

/// Orchestrates one training run as selected by the configured [`RunMode`]
pub struct Pipeline {
    config: AppConfig,
    preprocessor: Preprocessor,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        let preprocessor = Preprocessor::new(&config.preprocessing);
        Self {
            config,
            preprocessor,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn run(&self) -> Result<TrainingReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mode = self.config.run.mode;
        info!(run_id = %run_id, mode = ?mode, "Starting training run");

        let paths = &self.config.paths;
        let table = self.load_table(&paths.train_data)?;
        let labels = Labels::from_csv(
            &paths.train_labels,
            &self.config.columns.customer_id,
            &self.config.columns.label,
        )?;
        info!(
            customers = labels.len(),
            positives = labels.positive_count(),
            "Labels loaded"
        );

        let registry = self.compressors(&table, mode)?;
        let explained_variance = log_explained_variance(&registry);

        let matrix = registry.transform(&table.align_columns(&registry.feature_names()))?;
        let targets = labels.aligned(matrix.row_ids())?;
        info!(
            customers = matrix.n_rows(),
            features = matrix.n_cols(),
            "Composite matrix built"
        );

        let split = self.split(&targets)?;
        let (train_x, train_y) = subset(&matrix, &targets, &split.train);
        let (valid_x, valid_y) = subset(&matrix, &targets, &split.valid);

        let (params, search_score) =
            self.choose_params(mode, TrainData::new(&train_x, &train_y)?)?;

        let metric = AmexMetric;
        let options = TrainOptions {
            early_stopping_rounds: Some(self.config.training.early_stopping_rounds),
            metric: Some(&metric),
            log_every: self.config.training.log_every,
        };
        let booster = Booster::train(
            &params,
            TrainData::new(&train_x, &train_y)?,
            Some(TrainData::new(&valid_x, &valid_y)?),
            &options,
        )
        .context("Final training failed")?;

        let valid_pred = booster.predict(&valid_x)?;
        let valid_score = amex_metric(&valid_y, &valid_pred)?;
        let valid_logloss = log_loss(&valid_y, &valid_pred)?;
        info!(
            valid_score,
            valid_logloss,
            best_iteration = ?booster.best_iteration(),
            "Validation scored"
        );

        if let Some(path) = &paths.booster {
            booster.save(path)?;
            info!(path = %path.display(), trees = booster.num_trees(), "Booster saved");
        }

        let n_test = match &paths.test_data {
            Some(path) => Some(self.score_test(path, &registry, &booster)?),
            None => {
                info!("No test data configured, skipping submission");
                None
            }
        };

        let report = TrainingReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            run_mode: mode,
            params,
            search_score,
            best_iteration: booster.best_iteration(),
            valid_logloss,
            valid_score,
            n_train: split.train.len(),
            n_valid: split.valid.len(),
            n_test,
            explained_variance,
            feature_importance: booster.feature_importance(),
            prediction_histogram: Histogram::from_predictions(
                &valid_pred,
                self.config.report.histogram_bins,
            )?,
        };
        report.save(&paths.report)?;
        info!(path = %paths.report.display(), "Training report saved");
        report.print_summary(self.config.report.top_features);

        Ok(report)
    }

    fn load_table(&self, path: &Path) -> Result<CustomerTable> {
        let raw = RawFrame::from_csv(path, &self.config.columns)?;
        info!(
            path = %path.display(),
            rows = raw.rows.len(),
            columns = raw.columns.len(),
            "Data loaded"
        );
        self.preprocessor.clean(raw)
    }

    fn compressors(&self, table: &CustomerTable, mode: RunMode) -> Result<CompressorRegistry> {
        let cache = &self.config.paths.model_cache;
        if mode.uses_cache() {
            let registry = CompressorRegistry::load(cache)?;
            if registry.settings() != &self.config.compression {
                warn!(
                    cached = ?registry.settings(),
                    configured = ?self.config.compression,
                    "Cached compressors use different compression settings; keeping the cached ones"
                );
            }
            return Ok(registry);
        }

        let registry = CompressorRegistry::fit(table, &self.config.compression)?;
        registry.save(cache)?;
        Ok(registry)
    }

    fn split(&self, targets: &[f64]) -> Result<Split> {
        let training = &self.config.training;
        let split = if training.stratify {
            stratified_train_test_split(targets, training.test_size, training.random_state)?
        } else {
            train_test_split(targets.len(), training.test_size, training.random_state)?
        };
        info!(
            stratify = training.stratify,
            test_size = training.test_size,
            random_state = training.random_state,
            n_train = split.train.len(),
            n_valid = split.valid.len(),
            "Train/validation split"
        );
        Ok(split)
    }

    /// Final parameters: searched or fixed overrides over the base set
    fn choose_params(
        &self,
        mode: RunMode,
        train: TrainData<'_>,
    ) -> Result<(BoosterParams, Option<f64>)> {
        let (params, search_score) = if mode.searches_params() {
            let tuner = StepwiseTuner::new(self.config.search_params(), &self.config.search);
            let outcome = tuner.tune(train)?;
            let params = self.config.training_params().merged(&outcome.best);
            (params, Some(outcome.best_score))
        } else {
            info!(overrides = ?self.config.model.fixed_params, "Using fixed parameters");
            let params = self
                .config
                .training_params()
                .merged(&self.config.model.fixed_params);
            (params, None)
        };
        params.validate()?;
        Ok((params, search_score))
    }

    fn score_test(
        &self,
        path: &Path,
        registry: &CompressorRegistry,
        booster: &Booster,
    ) -> Result<usize> {
        let table = self
            .load_table(path)?
            .align_columns(&registry.feature_names());
        let matrix = registry.transform(&table)?;
        let predictions = booster.predict(&matrix)?;
        write_submission(&self.config.paths.submission, matrix.row_ids(), &predictions)?;
        Ok(predictions.len())
    }
}

fn subset(matrix: &FeatureMatrix, targets: &[f64], rows: &[usize]) -> (FeatureMatrix, Vec<f64>) {
    let labels = rows.iter().map(|&i| targets[i]).collect();
    (matrix.select_rows(rows), labels)
}

fn log_explained_variance(registry: &CompressorRegistry) -> Vec<FeatureVariance> {
    let entries: Vec<FeatureVariance> = registry
        .explained_variance()
        .into_iter()
        .map(|(feature, ratio)| FeatureVariance { feature, ratio })
        .collect();

    if !entries.is_empty() {
        let mean = entries.iter().map(|e| e.ratio).sum::<f64>() / entries.len() as f64;
        let low: Vec<&str> = entries
            .iter()
            .filter(|e| e.ratio < LOW_VARIANCE_RATIO)
            .map(|e| e.feature.as_str())
            .collect();
        info!(
            features = entries.len(),
            mean_ratio = mean,
            low_ratio = low.len(),
            "Explained variance of compressed features"
        );
        if !low.is_empty() {
            warn!(features = ?low, "Compressed scores keep little of these features' variance");
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::models::ParamOverrides;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::fmt::Write as _;
    use std::fs;
    use std::path::PathBuf;

    struct Workspace {
        dir: PathBuf,
    }

    impl Workspace {
        fn new() -> Self {
            let dir = std::env::temp_dir().join(format!("pipeline-run-{}", Uuid::new_v4()));
            fs::create_dir_all(&dir).unwrap();
            Self { dir }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.join(name)
        }
    }

    impl Drop for Workspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }

    /// Statements whose P_2 level drives default, plus one categorical
    fn write_data(ws: &Workspace, customers: usize, seed: u64) -> (PathBuf, PathBuf) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut data = String::from("customer_ID,S_2,P_2,B_1,D_63\n");
        let mut labels = String::from("customer_ID,target\n");

        for c in 0..customers {
            let id = format!("{}-{:04}", seed, c);
            let defaulted = rng.gen_bool(0.4);
            let level: f64 = if defaulted { 0.3 } else { 0.7 };
            let n_statements = rng.gen_range(3..=13);
            for m in 0..n_statements {
                let p2 = level + rng.gen_range(-0.15..0.15_f64) + 0.01 * m as f64;
                let b1 = if rng.gen_bool(0.1) {
                    String::new()
                } else {
                    format!("{:.4}", rng.gen_range(0.0..1.0_f64))
                };
                let d63 = ["CO", "CR", "CL"][rng.gen_range(0..3)];
                writeln!(data, "{},2017-{:02}-01,{:.4},{},{}", id, m % 12 + 1, p2, b1, d63).unwrap();
            }
            writeln!(labels, "{},{}", id, u8::from(defaulted)).unwrap();
        }

        let data_path = ws.path(&format!("data-{}.csv", seed));
        let labels_path = ws.path(&format!("labels-{}.csv", seed));
        fs::write(&data_path, data).unwrap();
        fs::write(&labels_path, labels).unwrap();
        (data_path, labels_path)
    }

    fn config(ws: &Workspace, mode: RunMode) -> AppConfig {
        let (train_data, train_labels) = write_data(ws, 80, 1);
        let (test_data, _) = write_data(ws, 20, 2);

        let mut config = AppConfig::default();
        config.paths.train_data = train_data;
        config.paths.train_labels = train_labels;
        config.paths.test_data = Some(test_data);
        config.paths.submission = ws.path("out/submission.csv");
        config.paths.model_cache = ws.path("out/model_score.json");
        config.paths.report = ws.path("out/report.json");
        config.paths.booster = Some(ws.path("out/booster.json"));
        config.run.mode = mode;
        config.model.base = BoosterParams {
            learning_rate: 0.2,
            num_leaves: 4,
            min_child_samples: 3,
            ..BoosterParams::default()
        };
        config.model.fixed_params = ParamOverrides {
            num_leaves: Some(6),
            ..ParamOverrides::default()
        };
        config.training.num_boost_round = 30;
        config.training.early_stopping_rounds = 10;
        config.search = SearchConfig {
            n_folds: 2,
            num_boost_round: 8,
            early_stopping_rounds: 3,
            regularization_trials: 1,
            seed: 0,
        };
        config
    }

    #[test]
    fn test_fit_fixed_run_writes_outputs() {
        let ws = Workspace::new();
        let config = config(&ws, RunMode::FitFixed);
        let report = Pipeline::new(config).run().unwrap();

        assert_eq!(report.n_train + report.n_valid, 80);
        assert_eq!(report.n_valid, 16);
        assert_eq!(report.n_test, Some(20));
        assert!(report.search_score.is_none());
        assert_eq!(report.params.num_leaves, 6);
        assert!(report.valid_logloss.is_finite());

        // numeric columns then one-hot indicators, all compressed
        let features: Vec<&str> = report
            .explained_variance
            .iter()
            .map(|e| e.feature.as_str())
            .collect();
        assert_eq!(features, ["P_2", "B_1", "D_63_CL", "D_63_CO", "D_63_CR"]);
        assert!(report
            .feature_importance
            .iter()
            .all(|f| f.feature.starts_with("PA_")));

        let submission = fs::read_to_string(ws.path("out/submission.csv")).unwrap();
        assert!(submission.starts_with("customer_ID,prediction\n"));
        assert_eq!(submission.lines().count(), 21);

        assert!(ws.path("out/model_score.json").exists());
        assert!(ws.path("out/report.json").exists());
        let booster = Booster::load(ws.path("out/booster.json")).unwrap();
        assert_eq!(booster.best_iteration(), report.best_iteration);
    }

    #[test]
    fn test_cached_run_reuses_compressors() {
        let ws = Workspace::new();
        let first = Pipeline::new(config(&ws, RunMode::FitFixed)).run().unwrap();
        let cached = CompressorRegistry::load(ws.path("out/model_score.json")).unwrap();

        let second = Pipeline::new(config(&ws, RunMode::CachedFixed)).run().unwrap();
        assert_eq!(second.explained_variance, first.explained_variance);
        assert_eq!(second.valid_score, first.valid_score);

        // the cache is read, never rewritten
        let after = CompressorRegistry::load(ws.path("out/model_score.json")).unwrap();
        assert_eq!(after, cached);
    }

    #[test]
    fn test_cached_run_without_cache_fails() {
        let ws = Workspace::new();
        let result = Pipeline::new(config(&ws, RunMode::CachedSearch)).run();
        assert!(result.is_err());
    }

    #[test]
    fn test_search_run_reports_cv_score() {
        let ws = Workspace::new();
        let report = Pipeline::new(config(&ws, RunMode::FitSearch)).run().unwrap();
        assert!(report.search_score.is_some());
        assert_eq!(report.run_mode, RunMode::FitSearch);
        assert_eq!(report.params.learning_rate, 0.2);
    }

    #[test]
    fn test_missing_label_is_error() {
        let ws = Workspace::new();
        let config = config(&ws, RunMode::FitFixed);
        let text = fs::read_to_string(&config.paths.train_labels).unwrap();
        let truncated: Vec<&str> = text.lines().take(40).collect();
        fs::write(&config.paths.train_labels, truncated.join("\n")).unwrap();

        assert!(Pipeline::new(config).run().is_err());
    }
}
