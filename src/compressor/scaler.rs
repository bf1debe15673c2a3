//! Per-column standardization

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Zero-mean, unit-variance scaling learned from a row-major matrix.
///
/// Uses the population standard deviation. A column whose variance is within
/// rounding error of its mean's magnitude counts as constant and keeps scale 1,
/// so it maps to zero instead of amplifying float noise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(data: &[f64], n_cols: usize) -> Result<Self> {
        ensure!(n_cols > 0, "Cannot scale a matrix without columns");
        ensure!(
            !data.is_empty() && data.len() % n_cols == 0,
            "Cannot scale {} values as rows of {}",
            data.len(),
            n_cols
        );
        let n_rows = data.len() / n_cols;

        let mut mean = vec![0.0; n_cols];
        for row in data.chunks_exact(n_cols) {
            for (m, &v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n_rows as f64;
        }

        let mut variance = vec![0.0; n_cols];
        for row in data.chunks_exact(n_cols) {
            for ((var, &v), &m) in variance.iter_mut().zip(row).zip(&mean) {
                *var += (v - m).powi(2);
            }
        }

        let n = n_rows as f64;
        let scale = variance
            .iter()
            .zip(&mean)
            .map(|(&var, &m)| {
                let var = var / n;
                // spread within accumulated rounding error of the mean
                let noise_floor = n * f64::EPSILON * var + (n * m * f64::EPSILON).powi(2);
                if var <= noise_floor {
                    1.0
                } else {
                    var.sqrt()
                }
            })
            .collect();

        Ok(Self { mean, scale })
    }

    pub fn n_cols(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// Standardize a row-major matrix with the fitted statistics
    pub fn transform(&self, data: &[f64]) -> Result<Vec<f64>> {
        let n_cols = self.n_cols();
        ensure!(
            data.len() % n_cols == 0,
            "Cannot scale {} values as rows of {}",
            data.len(),
            n_cols
        );
        Ok(data
            .chunks_exact(n_cols)
            .flat_map(|row| {
                row.iter()
                    .zip(&self.mean)
                    .zip(&self.scale)
                    .map(|((&v, &m), &s)| (v - m) / s)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_statistics() {
        let data = [1.0, 10.0, 3.0, 10.0];
        let scaler = StandardScaler::fit(&data, 2).unwrap();
        assert_eq!(scaler.mean(), &[2.0, 10.0]);
        assert!((scaler.scale()[0] - 1.0).abs() < 1e-12);
        // constant column keeps unit scale
        assert_eq!(scaler.scale()[1], 1.0);
    }

    #[test]
    fn test_transform_standardizes() {
        let data = [0.0, 2.0, 4.0, 6.0];
        let scaler = StandardScaler::fit(&data, 1).unwrap();
        let z = scaler.transform(&data).unwrap();
        let mean: f64 = z.iter().sum::<f64>() / 4.0;
        let var: f64 = z.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 4.0;
        assert!(mean.abs() < 1e-12);
        assert!((var - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_transform_uses_fitted_statistics() {
        let scaler = StandardScaler::fit(&[0.0, 2.0], 1).unwrap();
        assert_eq!(scaler.transform(&[3.0]).unwrap(), vec![2.0]);
    }

    #[test]
    fn test_large_column_with_rounding_noise_is_constant() {
        let step = 2.0 * f64::EPSILON * 1e6;
        let data = [1e6, 1e6 + step, 1e6, 1e6 + step];
        let scaler = StandardScaler::fit(&data, 1).unwrap();
        assert_eq!(scaler.scale(), &[1.0]);
        let z = scaler.transform(&data).unwrap();
        assert!(z.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn test_small_but_real_spread_is_scaled() {
        let data = [1e-9, 3e-9, 1e-9, 3e-9];
        let scaler = StandardScaler::fit(&data, 1).unwrap();
        assert!((scaler.scale()[0] - 1e-9).abs() < 1e-15);
    }

    #[test]
    fn test_rejects_ragged_input() {
        assert!(StandardScaler::fit(&[1.0, 2.0, 3.0], 2).is_err());
    }
}
