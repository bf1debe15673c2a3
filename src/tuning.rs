//! Cross-validated, stage-by-stage booster parameter search.
//!
//! Each stage tries a handful of values for one group of parameters on top
//! of the best set found so far and keeps a candidate only when it raises
//! the mean held-out metric.

use crate::config::SearchConfig;
use crate::metric::{AmexMetric, EvalMetric};
use crate::model_selection::{KFold, Split};
use crate::models::{Booster, BoosterParams, ParamOverrides, TrainData, TrainOptions};
use anyhow::{ensure, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const FEATURE_FRACTIONS: [f64; 7] = [0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];
const NUM_LEAVES: [usize; 6] = [7, 15, 31, 63, 127, 255];
const MIN_CHILD_SAMPLES: [usize; 5] = [5, 10, 25, 50, 100];
const BAGGING_TRIALS: usize = 10;

/// Log-uniform range of the L1/L2 regularization search
const REGULARIZATION_RANGE: (f64, f64) = (1e-8, 10.0);

/// Held-out scores of one parameter set
#[derive(Debug, Clone, PartialEq)]
pub struct CvResult {
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
    /// Mean best round over folds
    pub mean_best_iteration: f64,
}

/// Train one booster per fold, stopping early on the held-out fold, and
/// score each held-out fold with `metric`
pub fn cross_validate(
    params: &BoosterParams,
    data: TrainData<'_>,
    folds: &[Split],
    early_stopping_rounds: usize,
    metric: &dyn EvalMetric,
) -> Result<CvResult> {
    ensure!(!folds.is_empty(), "Cross-validation needs at least one fold");

    let mut fold_scores = Vec::with_capacity(folds.len());
    let mut best_iterations = Vec::with_capacity(folds.len());

    for (k, fold) in folds.iter().enumerate() {
        let train_x = data.features.select_rows(&fold.train);
        let train_y: Vec<f64> = fold.train.iter().map(|&i| data.labels[i]).collect();
        let valid_x = data.features.select_rows(&fold.valid);
        let valid_y: Vec<f64> = fold.valid.iter().map(|&i| data.labels[i]).collect();

        let options = TrainOptions {
            early_stopping_rounds: Some(early_stopping_rounds),
            metric: None,
            log_every: 0,
        };
        let booster = Booster::train(
            params,
            TrainData::new(&train_x, &train_y)?,
            Some(TrainData::new(&valid_x, &valid_y)?),
            &options,
        )
        .with_context(|| format!("Training failed on fold {}", k))?;

        let predictions = booster.predict(&valid_x)?;
        let score = metric
            .evaluate(&valid_y, &predictions)
            .with_context(|| format!("Scoring failed on fold {}", k))?;

        debug!(fold = k, score, best_iteration = ?booster.best_iteration(), "Fold scored");
        fold_scores.push(score);
        best_iterations.push(booster.best_iteration().unwrap_or(booster.num_trees()) as f64);
    }

    let n = fold_scores.len() as f64;
    Ok(CvResult {
        mean_score: fold_scores.iter().sum::<f64>() / n,
        mean_best_iteration: best_iterations.iter().sum::<f64>() / n,
        fold_scores,
    })
}

/// One evaluated parameter set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub stage: String,
    pub params: ParamOverrides,
    pub score: f64,
}

/// Result of a parameter search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningOutcome {
    /// Best overrides, to be merged over the base parameters
    pub best: ParamOverrides,
    pub best_score: f64,
    pub trials: Vec<Trial>,
}

/// Stepwise search over feature fraction, leaves, bagging, regularization
/// and leaf size
pub struct StepwiseTuner {
    base: BoosterParams,
    folds: KFold,
    early_stopping_rounds: usize,
    regularization_trials: usize,
    seed: u64,
}

struct SearchState<'a> {
    data: TrainData<'a>,
    folds: Vec<Split>,
    metric: AmexMetric,
    best: ParamOverrides,
    best_score: f64,
    trials: Vec<Trial>,
}

impl StepwiseTuner {
    pub fn new(base: BoosterParams, settings: &SearchConfig) -> Self {
        Self {
            base,
            folds: KFold::new(settings.n_folds),
            early_stopping_rounds: settings.early_stopping_rounds,
            regularization_trials: settings.regularization_trials,
            seed: settings.seed,
        }
    }

    pub fn tune(&self, data: TrainData<'_>) -> Result<TuningOutcome> {
        let folds = self.folds.split(data.features.n_rows())?;
        info!(
            rows = data.features.n_rows(),
            folds = folds.len(),
            rounds = self.base.num_iterations,
            "Starting parameter search"
        );

        let mut state = SearchState {
            data,
            folds,
            metric: AmexMetric,
            best: ParamOverrides::default(),
            best_score: f64::NEG_INFINITY,
            trials: Vec::new(),
        };
        let mut rng = StdRng::seed_from_u64(self.seed);

        self.evaluate(&mut state, "baseline", ParamOverrides::default())?;

        for fraction in FEATURE_FRACTIONS {
            let candidate = ParamOverrides {
                feature_fraction: Some(fraction),
                ..state.best.clone()
            };
            self.evaluate(&mut state, "feature_fraction", candidate)?;
        }

        for leaves in NUM_LEAVES {
            let candidate = ParamOverrides {
                num_leaves: Some(leaves),
                ..state.best.clone()
            };
            self.evaluate(&mut state, "num_leaves", candidate)?;
        }

        for _ in 0..BAGGING_TRIALS {
            let candidate = ParamOverrides {
                bagging_fraction: Some(rng.gen_range(0.4..=1.0)),
                bagging_freq: Some(rng.gen_range(1..=7)),
                ..state.best.clone()
            };
            self.evaluate(&mut state, "bagging", candidate)?;
        }

        let centre = state
            .best
            .feature_fraction
            .unwrap_or(self.base.feature_fraction);
        for fraction in refined_fractions(centre) {
            let candidate = ParamOverrides {
                feature_fraction: Some(fraction),
                ..state.best.clone()
            };
            self.evaluate(&mut state, "feature_fraction_refined", candidate)?;
        }

        for _ in 0..self.regularization_trials {
            let candidate = ParamOverrides {
                lambda_l1: Some(log_uniform(&mut rng, REGULARIZATION_RANGE)),
                lambda_l2: Some(log_uniform(&mut rng, REGULARIZATION_RANGE)),
                ..state.best.clone()
            };
            self.evaluate(&mut state, "regularization", candidate)?;
        }

        for min_child in MIN_CHILD_SAMPLES {
            let candidate = ParamOverrides {
                min_child_samples: Some(min_child),
                ..state.best.clone()
            };
            self.evaluate(&mut state, "min_child_samples", candidate)?;
        }

        info!(
            best_score = state.best_score,
            trials = state.trials.len(),
            best = ?state.best,
            "Parameter search finished"
        );

        Ok(TuningOutcome {
            best: state.best,
            best_score: state.best_score,
            trials: state.trials,
        })
    }

    fn evaluate(
        &self,
        state: &mut SearchState<'_>,
        stage: &str,
        candidate: ParamOverrides,
    ) -> Result<()> {
        let params = self.base.merged(&candidate);
        let cv = cross_validate(
            &params,
            state.data,
            &state.folds,
            self.early_stopping_rounds,
            &state.metric,
        )
        .with_context(|| format!("Search stage {} failed", stage))?;

        let improved = cv.mean_score > state.best_score;
        info!(
            stage,
            trial = state.trials.len(),
            score = cv.mean_score,
            best_iteration = cv.mean_best_iteration,
            improved,
            "Search trial"
        );

        if improved {
            state.best = candidate.clone();
            state.best_score = cv.mean_score;
        }
        state.trials.push(Trial {
            stage: stage.to_string(),
            params: candidate,
            score: cv.mean_score,
        });
        Ok(())
    }
}

/// Six evenly spaced fractions within 0.08 of `centre`, kept in [0.4, 1.0]
fn refined_fractions(centre: f64) -> Vec<f64> {
    let mut fractions: Vec<f64> = (0..6)
        .map(|i| (centre - 0.08 + 0.032 * i as f64).clamp(0.4, 1.0))
        .collect();
    fractions.dedup();
    fractions
}

fn log_uniform(rng: &mut StdRng, (low, high): (f64, f64)) -> f64 {
    rng.gen_range(low.ln()..high.ln()).exp()
}
