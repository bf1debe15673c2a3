//! Gradient boosting hyperparameters

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Complete parameter set of a booster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoosterParams {
    /// Shrinkage applied to every leaf value
    pub learning_rate: f64,
    /// Maximum leaves per tree (trees grow leaf-wise)
    pub num_leaves: usize,
    /// Maximum tree depth, -1 for unlimited
    pub max_depth: i32,
    /// Maximum histogram bins per feature (at most 256)
    pub max_bin: usize,
    /// Minimum rows in a leaf
    pub min_child_samples: usize,
    /// Minimum hessian sum in a leaf
    pub min_sum_hessian: f64,
    /// L1 regularization of leaf values
    pub lambda_l1: f64,
    /// L2 regularization of leaf values
    pub lambda_l2: f64,
    /// Share of features sampled for each tree
    pub feature_fraction: f64,
    /// Share of rows sampled when bagging
    pub bagging_fraction: f64,
    /// Resample rows every N rounds, 0 disables bagging
    pub bagging_freq: usize,
    /// Boosting rounds
    pub num_iterations: usize,
    pub seed: u64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.05,
            num_leaves: 31,
            max_depth: -1,
            max_bin: 255,
            min_child_samples: 20,
            min_sum_hessian: 1e-3,
            lambda_l1: 0.0,
            lambda_l2: 0.0,
            feature_fraction: 1.0,
            bagging_fraction: 1.0,
            bagging_freq: 0,
            num_iterations: 100,
            seed: 0,
        }
    }
}

impl BoosterParams {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.learning_rate > 0.0 && self.learning_rate.is_finite(),
            "learning_rate must be positive, got {}",
            self.learning_rate
        );
        ensure!(self.num_leaves >= 2, "num_leaves must be at least 2, got {}", self.num_leaves);
        ensure!(
            self.max_depth == -1 || self.max_depth > 0,
            "max_depth must be -1 or positive, got {}",
            self.max_depth
        );
        ensure!(
            (2..=256).contains(&self.max_bin),
            "max_bin must be within 2..=256, got {}",
            self.max_bin
        );
        ensure!(self.min_child_samples >= 1, "min_child_samples must be at least 1");
        ensure!(self.min_sum_hessian >= 0.0, "min_sum_hessian must not be negative");
        ensure!(
            self.lambda_l1 >= 0.0 && self.lambda_l2 >= 0.0,
            "lambda_l1 and lambda_l2 must not be negative"
        );
        ensure!(
            self.feature_fraction > 0.0 && self.feature_fraction <= 1.0,
            "feature_fraction must be within (0, 1], got {}",
            self.feature_fraction
        );
        ensure!(
            self.bagging_fraction > 0.0 && self.bagging_fraction <= 1.0,
            "bagging_fraction must be within (0, 1], got {}",
            self.bagging_fraction
        );
        ensure!(self.num_iterations >= 1, "num_iterations must be at least 1");
        Ok(())
    }

    /// Depth limit, `None` when unlimited
    pub fn depth_limit(&self) -> Option<usize> {
        usize::try_from(self.max_depth).ok().filter(|&d| d > 0)
    }

    /// Whether rows are resampled during training
    pub fn bagging_enabled(&self) -> bool {
        self.bagging_freq > 0 && self.bagging_fraction < 1.0
    }

    /// This parameter set with `overrides` applied on top
    pub fn merged(&self, overrides: &ParamOverrides) -> BoosterParams {
        BoosterParams {
            learning_rate: overrides.learning_rate.unwrap_or(self.learning_rate),
            num_leaves: overrides.num_leaves.unwrap_or(self.num_leaves),
            max_depth: overrides.max_depth.unwrap_or(self.max_depth),
            max_bin: self.max_bin,
            min_child_samples: overrides.min_child_samples.unwrap_or(self.min_child_samples),
            min_sum_hessian: self.min_sum_hessian,
            lambda_l1: overrides.lambda_l1.unwrap_or(self.lambda_l1),
            lambda_l2: overrides.lambda_l2.unwrap_or(self.lambda_l2),
            feature_fraction: overrides.feature_fraction.unwrap_or(self.feature_fraction),
            bagging_fraction: overrides.bagging_fraction.unwrap_or(self.bagging_fraction),
            bagging_freq: overrides.bagging_freq.unwrap_or(self.bagging_freq),
            num_iterations: overrides.num_iterations.unwrap_or(self.num_iterations),
            seed: self.seed,
        }
    }
}

/// Partial parameter set layered over a base, as produced by the search or
/// configured as the fixed fallback
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_leaves: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_child_samples: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lambda_l1: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lambda_l2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_fraction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bagging_fraction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bagging_freq: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_iterations: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_are_valid() {
        let params = BoosterParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.depth_limit(), None);
        assert!(!params.bagging_enabled());
    }

    #[test]
    fn test_merge_overrides() {
        let base = BoosterParams::default();
        let overrides = ParamOverrides {
            num_leaves: Some(256),
            bagging_fraction: Some(0.5),
            bagging_freq: Some(5),
            ..ParamOverrides::default()
        };

        let merged = base.merged(&overrides);
        assert_eq!(merged.num_leaves, 256);
        assert_eq!(merged.learning_rate, base.learning_rate);
        assert!(merged.bagging_enabled());
        assert_eq!(base.merged(&ParamOverrides::default()), base);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let bad = [
            BoosterParams { learning_rate: 0.0, ..BoosterParams::default() },
            BoosterParams { num_leaves: 1, ..BoosterParams::default() },
            BoosterParams { max_depth: 0, ..BoosterParams::default() },
            BoosterParams { max_bin: 1000, ..BoosterParams::default() },
            BoosterParams { feature_fraction: 1.5, ..BoosterParams::default() },
            BoosterParams { bagging_fraction: 0.0, ..BoosterParams::default() },
        ];
        for params in bad {
            assert!(params.validate().is_err(), "{:?}", params);
        }
    }

    #[test]
    fn test_depth_limit() {
        let params = BoosterParams { max_depth: 6, ..BoosterParams::default() };
        assert_eq!(params.depth_limit(), Some(6));
    }

    #[test]
    fn test_overrides_serialize_only_set_fields() {
        let overrides = ParamOverrides {
            num_leaves: Some(64),
            ..ParamOverrides::default()
        };
        let json = serde_json::to_string(&overrides).unwrap();
        assert_eq!(json, r#"{"num_leaves":64}"#);
    }
}
