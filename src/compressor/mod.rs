//! Per-feature time-series compression.
//!
//! Each feature's 13-statement customer history is standardized and
//! projected onto its first principal axis, leaving one score per customer
//! and feature.

pub mod pca;
pub mod registry;
pub mod scaler;
pub mod sequence;

pub use pca::Pca;
pub use registry::CompressorRegistry;
pub use scaler::StandardScaler;
pub use sequence::{OverflowPolicy, SequenceMatrix};

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Fitted compression model of one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCompressor {
    feature: String,
    scaler: StandardScaler,
    pca: Pca,
}

impl FeatureCompressor {
    /// Learn the scaling and principal axis from a population of sequences
    pub fn fit(feature: &str, sequences: &SequenceMatrix) -> Result<Self> {
        let n_cols = sequences.length();
        let scaler = StandardScaler::fit(sequences.values(), n_cols)?;
        let standardized = scaler.transform(sequences.values())?;
        let pca = Pca::fit(&standardized, n_cols)?;

        Ok(Self {
            feature: feature.to_string(),
            scaler,
            pca,
        })
    }

    /// One score per customer, using the fitted scaling (never refitted)
    pub fn transform(&self, sequences: &SequenceMatrix) -> Result<Vec<f64>> {
        ensure!(
            sequences.length() == self.scaler.n_cols(),
            "Feature {} was fitted on sequences of length {}, got {}",
            self.feature,
            self.scaler.n_cols(),
            sequences.length()
        );
        let standardized = self.scaler.transform(sequences.values())?;
        self.pca.transform(&standardized)
    }

    pub fn feature(&self) -> &str {
        &self.feature
    }

    pub fn sequence_length(&self) -> usize {
        self.scaler.n_cols()
    }

    /// Diagnostic: share of the standardized variance kept by the score
    pub fn explained_variance_ratio(&self) -> f64 {
        self.pca.explained_variance_ratio()
    }

    pub fn pca(&self) -> &Pca {
        &self.pca
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_customers() -> SequenceMatrix {
        let mut values: Vec<f64> = (1..=13).map(f64::from).collect();
        values.extend(std::iter::repeat(5.0).take(13));
        SequenceMatrix::from_rows(vec!["A".to_string(), "B".to_string()], 13, values).unwrap()
    }

    #[test]
    fn test_increasing_vs_constant_customer() {
        let seq = two_customers();
        let model = FeatureCompressor::fit("P_2", &seq).unwrap();

        // two points: one axis carries all of the variance
        assert!((model.explained_variance_ratio() - 1.0).abs() < 1e-9);

        let scores = model.transform(&seq).unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores[0].abs() > 1.0);
        assert!((scores[0] + scores[1]).abs() < 1e-9);

        // with two customers B standardizes to -1/+1, not to the zero vector
        let standardized = model.scaler().transform(seq.row(1)).unwrap();
        assert!(standardized
            .iter()
            .all(|v| (v.abs() - 1.0).abs() < 1e-12 || v.abs() < 1e-12));
        let origin = model.pca().project(&[0.0; 13]);
        assert!((scores[1] - origin).abs() > 1.0);
    }

    #[test]
    fn test_constant_customer_at_means_scores_origin() {
        // A increases, C mirrors A around 5, B stays at 5
        let mut values: Vec<f64> = (1..=13).map(f64::from).collect();
        values.extend(std::iter::repeat(5.0).take(13));
        values.extend((1..=13).map(|v| 10.0 - f64::from(v)));
        let ids = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let seq = SequenceMatrix::from_rows(ids, 13, values).unwrap();
        let model = FeatureCompressor::fit("P_2", &seq).unwrap();

        assert!((model.explained_variance_ratio() - 1.0).abs() < 1e-9);

        let standardized = model.scaler().transform(seq.row(1)).unwrap();
        assert!(standardized.iter().all(|v| v.abs() < 1e-12));

        let scores = model.transform(&seq).unwrap();
        let origin = model.pca().project(&[0.0; 13]);
        assert!((scores[1] - origin).abs() < 1e-9);
        assert!(scores[1].abs() < 1e-9);
        assert!(scores[0].abs() > 1.0);
        assert!((scores[0] + scores[2]).abs() < 1e-9);
    }

    #[test]
    fn test_transform_is_deterministic() {
        let seq = two_customers();
        let model = FeatureCompressor::fit("P_2", &seq).unwrap();
        let first = model.transform(&seq).unwrap();
        let second = model.transform(&seq).unwrap();
        assert_eq!(first, second);

        let refit = FeatureCompressor::fit("P_2", &seq).unwrap();
        assert_eq!(refit, model);
    }

    #[test]
    fn test_constant_feature_boundary() {
        let seq = SequenceMatrix::from_rows(
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            3,
            vec![7.0; 9],
        )
        .unwrap();
        let model = FeatureCompressor::fit("D_39", &seq).unwrap();
        assert_eq!(model.explained_variance_ratio(), 0.0);
        assert_eq!(model.transform(&seq).unwrap(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_rejects_other_sequence_length() {
        let model = FeatureCompressor::fit("P_2", &two_customers()).unwrap();
        let short = SequenceMatrix::from_rows(vec!["A".to_string()], 2, vec![1.0, 2.0]).unwrap();
        assert!(model.transform(&short).is_err());
    }
}
