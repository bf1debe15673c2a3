//! Gradient-boosted tree classifier with binary log-loss

use super::binning::BinnedData;
use super::params::BoosterParams;
use super::tree::{Tree, TreeLearner};
use crate::metric::{log_loss, EvalMetric};
use crate::types::matrix::FeatureMatrix;
use anyhow::{bail, ensure, Context, Result};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{debug, info};

/// Features and aligned 0/1 labels
#[derive(Debug, Clone, Copy)]
pub struct TrainData<'a> {
    pub features: &'a FeatureMatrix,
    pub labels: &'a [f64],
}

impl<'a> TrainData<'a> {
    pub fn new(features: &'a FeatureMatrix, labels: &'a [f64]) -> Result<Self> {
        ensure!(
            features.n_rows() == labels.len(),
            "{} rows but {} labels",
            features.n_rows(),
            labels.len()
        );
        ensure!(
            labels.iter().all(|&y| y == 0.0 || y == 1.0),
            "Labels must be 0 or 1"
        );
        Ok(Self { features, labels })
    }
}

/// Training controls beyond the model parameters
#[derive(Default)]
pub struct TrainOptions<'m> {
    /// Stop when validation log-loss has not improved for this many rounds
    /// (`None` or 0 = run every round)
    pub early_stopping_rounds: Option<usize>,
    /// Extra metric evaluated on the validation set every round
    pub metric: Option<&'m dyn EvalMetric>,
    /// Log an evaluation line every N rounds (0 = silent)
    pub log_every: usize,
}

/// Validation scores after one boosting round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
    /// 1-based round
    pub iteration: usize,
    pub valid_logloss: f64,
    pub valid_metric: Option<f64>,
}

/// Split-count and gain importance of one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub splits: u64,
    pub gain: f64,
}

/// Trained ensemble; immutable once `train` returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booster {
    params: BoosterParams,
    feature_names: Vec<String>,
    init_score: f64,
    trees: Vec<Tree>,
    best_iteration: Option<usize>,
    #[serde(default)]
    history: Vec<EvalRecord>,
}

impl Booster {
    /// Fit a booster; with a validation set, the model is cut back to the
    /// round with the lowest validation log-loss
    pub fn train(
        params: &BoosterParams,
        train: TrainData<'_>,
        valid: Option<TrainData<'_>>,
        options: &TrainOptions<'_>,
    ) -> Result<Self> {
        params.validate()?;
        let n = train.features.n_rows();
        ensure!(n > 0, "Cannot train on an empty set");
        ensure!(train.features.n_cols() > 0, "Cannot train without features");
        if let Some(v) = &valid {
            ensure!(
                v.features.feature_names() == train.features.feature_names(),
                "Validation features differ from training features"
            );
        }

        let positives: f64 = train.labels.iter().sum();
        let base_rate = positives / n as f64;
        if base_rate <= 0.0 || base_rate >= 1.0 {
            bail!("Training labels contain a single class");
        }
        let init_score = (base_rate / (1.0 - base_rate)).ln();

        let binned = BinnedData::from_matrix(train.features, params.max_bin);
        let n_features = binned.n_features();
        let n_sampled = ((n_features as f64 * params.feature_fraction).round() as usize)
            .clamp(1, n_features);
        let n_bagged = ((n as f64 * params.bagging_fraction).round() as usize).clamp(1, n);

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut raw = vec![init_score; n];
        let mut valid_raw = valid.map(|v| vec![init_score; v.features.n_rows()]);
        let mut gradients = vec![0.0; n];
        let mut hessians = vec![0.0; n];
        let mut bag: Vec<usize> = (0..n).collect();

        let mut trees = Vec::new();
        let mut history = Vec::new();
        let mut best: Option<(usize, f64)> = None;
        let early_stopping_rounds = options.early_stopping_rounds.filter(|&rounds| rounds > 0);

        info!(
            rows = n,
            features = n_features,
            rounds = params.num_iterations,
            num_leaves = params.num_leaves,
            learning_rate = params.learning_rate,
            "Training booster"
        );

        for iteration in 1..=params.num_iterations {
            for i in 0..n {
                let p = sigmoid(raw[i]);
                gradients[i] = p - train.labels[i];
                hessians[i] = (p * (1.0 - p)).max(1e-16);
            }

            if params.bagging_enabled() && (iteration - 1) % params.bagging_freq == 0 {
                bag = sample(&mut rng, n, n_bagged).into_vec();
                bag.sort_unstable();
            }

            let mut features: Vec<usize> = if n_sampled < n_features {
                sample(&mut rng, n_features, n_sampled).into_vec()
            } else {
                (0..n_features).collect()
            };
            features.sort_unstable();

            let tree = TreeLearner::new(&binned, &gradients, &hessians, params, &features)
                .grow(bag.clone());

            for (i, r) in raw.iter_mut().enumerate() {
                *r += tree.predict(train.features.row(i));
            }

            if let (Some(v), Some(v_raw)) = (&valid, valid_raw.as_mut()) {
                for (i, r) in v_raw.iter_mut().enumerate() {
                    *r += tree.predict(v.features.row(i));
                }
                let probabilities: Vec<f64> = v_raw.iter().map(|&r| sigmoid(r)).collect();
                let valid_logloss = log_loss(v.labels, &probabilities)?;
                let valid_metric = match options.metric {
                    Some(metric) => Some(metric.evaluate(v.labels, &probabilities)?),
                    None => None,
                };

                debug!(iteration, valid_logloss, ?valid_metric, "Boosting round");
                if options.log_every > 0 && iteration % options.log_every == 0 {
                    info!(iteration, valid_logloss, ?valid_metric, "Validation scores");
                }

                history.push(EvalRecord {
                    iteration,
                    valid_logloss,
                    valid_metric,
                });

                if best.map_or(true, |(_, loss)| valid_logloss < loss) {
                    best = Some((iteration, valid_logloss));
                }
            }

            trees.push(tree);

            if let (Some(rounds), Some((best_iter, _))) = (early_stopping_rounds, best) {
                if iteration - best_iter >= rounds {
                    info!(iteration, best_iteration = best_iter, "Early stopping");
                    break;
                }
            }
        }

        let best_iteration = best.map(|(iteration, _)| iteration);
        if let Some(keep) = best_iteration {
            trees.truncate(keep);
        }

        let booster = Self {
            params: params.clone(),
            feature_names: train.features.feature_names().to_vec(),
            init_score,
            trees,
            best_iteration,
            history,
        };

        if let Some(record) = booster.best_record() {
            info!(
                best_iteration = record.iteration,
                valid_logloss = record.valid_logloss,
                valid_metric = ?record.valid_metric,
                "Booster trained"
            );
        } else {
            info!(trees = booster.trees.len(), "Booster trained");
        }

        Ok(booster)
    }

    /// Raw log-odds scores
    pub fn predict_raw(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        ensure!(
            features.feature_names() == self.feature_names.as_slice(),
            "Feature columns differ from the ones the booster was trained on"
        );
        Ok((0..features.n_rows())
            .map(|i| {
                let row = features.row(i);
                self.init_score + self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
            })
            .collect())
    }

    /// Default probabilities
    pub fn predict(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        Ok(self
            .predict_raw(features)?
            .into_iter()
            .map(sigmoid)
            .collect())
    }

    /// Importance of every feature, in column order
    pub fn feature_importance(&self) -> Vec<FeatureImportance> {
        let mut importance: Vec<FeatureImportance> = self
            .feature_names
            .iter()
            .map(|f| FeatureImportance {
                feature: f.clone(),
                splits: 0,
                gain: 0.0,
            })
            .collect();
        for tree in &self.trees {
            for (feature, gain) in tree.splits() {
                importance[feature].splits += 1;
                importance[feature].gain += gain;
            }
        }
        importance
    }

    pub fn params(&self) -> &BoosterParams {
        &self.params
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Round with the lowest validation log-loss, when validated
    pub fn best_iteration(&self) -> Option<usize> {
        self.best_iteration
    }

    pub fn history(&self) -> &[EvalRecord] {
        &self.history
    }

    pub fn best_record(&self) -> Option<&EvalRecord> {
        let best = self.best_iteration?;
        self.history.iter().find(|r| r.iteration == best)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create model file {}", path.display()))?;
        serde_json::to_writer(BufWriter::new(file), self)
            .with_context(|| format!("Failed to write model file {}", path.display()))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open model file {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse model file {}", path.display()))
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
