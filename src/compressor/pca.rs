//! Single-component principal component analysis

use anyhow::{ensure, Result};
use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// First principal axis of a row-major matrix.
///
/// Fitted by eigen-decomposition of the sample covariance, so the result is
/// deterministic for a given input. The axis sign is fixed so that its
/// largest-magnitude loading is positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pca {
    mean: Vec<f64>,
    component: Vec<f64>,
    explained_variance: f64,
    explained_variance_ratio: f64,
}

impl Pca {
    pub fn fit(data: &[f64], n_cols: usize) -> Result<Self> {
        ensure!(n_cols > 0, "Cannot fit PCA without columns");
        ensure!(
            data.len() % n_cols == 0,
            "Cannot fit PCA on {} values as rows of {}",
            data.len(),
            n_cols
        );
        let n_rows = data.len() / n_cols;
        ensure!(n_rows >= 2, "PCA needs at least two rows, got {}", n_rows);

        let mut mean = vec![0.0; n_cols];
        for row in data.chunks_exact(n_cols) {
            for (m, &v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n_rows as f64;
        }

        let mut cov = DMatrix::<f64>::zeros(n_cols, n_cols);
        for row in data.chunks_exact(n_cols) {
            for i in 0..n_cols {
                let di = row[i] - mean[i];
                for j in i..n_cols {
                    cov[(i, j)] += di * (row[j] - mean[j]);
                }
            }
        }
        let denom = (n_rows - 1) as f64;
        for i in 0..n_cols {
            for j in i..n_cols {
                let v = cov[(i, j)] / denom;
                cov[(i, j)] = v;
                cov[(j, i)] = v;
            }
        }

        let eigen = SymmetricEigen::new(cov);
        let (top, top_value) = eigen
            .eigenvalues
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, v)| {
                if v > best.1 {
                    (i, v)
                } else {
                    best
                }
            });

        let mut component: Vec<f64> = eigen.eigenvectors.column(top).iter().copied().collect();
        let pivot = component
            .iter()
            .copied()
            .fold(0.0_f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
        if pivot < 0.0 {
            for c in &mut component {
                *c = -*c;
            }
        }

        let total: f64 = eigen.eigenvalues.iter().sum();
        let explained_variance = top_value.max(0.0);
        let explained_variance_ratio = if total > f64::EPSILON {
            explained_variance / total
        } else {
            warn!("Input has no variance; principal axis is arbitrary");
            0.0
        };

        Ok(Self {
            mean,
            component,
            explained_variance,
            explained_variance_ratio,
        })
    }

    pub fn component(&self) -> &[f64] {
        &self.component
    }

    pub fn explained_variance(&self) -> f64 {
        self.explained_variance
    }

    /// Share of total variance captured by the axis
    pub fn explained_variance_ratio(&self) -> f64 {
        self.explained_variance_ratio
    }

    /// Project one row onto the axis
    pub fn project(&self, row: &[f64]) -> f64 {
        row.iter()
            .zip(&self.mean)
            .zip(&self.component)
            .map(|((&v, &m), &c)| (v - m) * c)
            .sum()
    }

    /// Project every row of a row-major matrix
    pub fn transform(&self, data: &[f64]) -> Result<Vec<f64>> {
        let n_cols = self.mean.len();
        ensure!(
            data.len() % n_cols == 0,
            "Cannot project {} values as rows of {}",
            data.len(),
            n_cols
        );
        Ok(data.chunks_exact(n_cols).map(|row| self.project(row)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_of_correlated_data() {
        // points on the line y = x
        let data = [1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0];
        let pca = Pca::fit(&data, 2).unwrap();

        let expected = std::f64::consts::FRAC_1_SQRT_2;
        assert!((pca.component()[0] - expected).abs() < 1e-9);
        assert!((pca.component()[1] - expected).abs() < 1e-9);
        assert!((pca.explained_variance_ratio() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sign_convention() {
        // dominant direction along -x; flipped so the loading is positive
        let data = [3.0, 0.0, 1.0, 0.1, -1.0, 0.0, -3.0, -0.1];
        let pca = Pca::fit(&data, 2).unwrap();
        let largest = pca
            .component()
            .iter()
            .copied()
            .fold(0.0_f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
        assert!(largest > 0.0);
    }

    #[test]
    fn test_projection_is_centered() {
        let data = [1.0, 2.0, 3.0, 6.0, 5.0, 10.0];
        let pca = Pca::fit(&data, 2).unwrap();
        let scores = pca.transform(&data).unwrap();
        assert!(scores.iter().sum::<f64>().abs() < 1e-9);
    }

    #[test]
    fn test_constant_input_has_zero_ratio() {
        let data = [2.0, 2.0, 2.0, 2.0, 2.0, 2.0];
        let pca = Pca::fit(&data, 2).unwrap();
        assert_eq!(pca.explained_variance_ratio(), 0.0);
        assert!(pca.transform(&data).unwrap().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_needs_two_rows() {
        assert!(Pca::fit(&[1.0, 2.0], 2).is_err());
    }
}
