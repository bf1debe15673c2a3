//! Dense feature matrix with one row per customer

use anyhow::{ensure, Result};

/// Row-major feature matrix keyed by row id.
///
/// Used for the composite matrix of compressed scores and as booster input.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    feature_names: Vec<String>,
    row_ids: Vec<String>,
    data: Vec<f64>,
}

impl FeatureMatrix {
    pub fn new(feature_names: Vec<String>, row_ids: Vec<String>, data: Vec<f64>) -> Result<Self> {
        ensure!(
            data.len() == feature_names.len() * row_ids.len(),
            "Matrix holds {} values for {} rows x {} columns",
            data.len(),
            row_ids.len(),
            feature_names.len()
        );
        Ok(Self {
            feature_names,
            row_ids,
            data,
        })
    }

    /// Build from per-column vectors, each as long as `row_ids`
    pub fn from_columns(
        feature_names: Vec<String>,
        row_ids: Vec<String>,
        columns: &[Vec<f64>],
    ) -> Result<Self> {
        ensure!(
            columns.len() == feature_names.len(),
            "{} columns for {} names",
            columns.len(),
            feature_names.len()
        );
        let n_rows = row_ids.len();
        for (name, column) in feature_names.iter().zip(columns) {
            ensure!(
                column.len() == n_rows,
                "Column {} has {} values, expected {}",
                name,
                column.len(),
                n_rows
            );
        }

        let mut data = Vec::with_capacity(n_rows * columns.len());
        for i in 0..n_rows {
            data.extend(columns.iter().map(|c| c[i]));
        }
        Self::new(feature_names, row_ids, data)
    }

    pub fn n_rows(&self) -> usize {
        self.row_ids.len()
    }

    pub fn n_cols(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn row_ids(&self) -> &[String] {
        &self.row_ids
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let width = self.n_cols();
        &self.data[row * width..(row + 1) * width]
    }

    pub fn value(&self, row: usize, column: usize) -> f64 {
        self.data[row * self.n_cols() + column]
    }

    pub fn column(&self, column: usize) -> Vec<f64> {
        (0..self.n_rows()).map(|i| self.value(i, column)).collect()
    }

    /// Copy of the given rows, in the given order
    pub fn select_rows(&self, rows: &[usize]) -> FeatureMatrix {
        let mut data = Vec::with_capacity(rows.len() * self.n_cols());
        let mut row_ids = Vec::with_capacity(rows.len());
        for &r in rows {
            data.extend_from_slice(self.row(r));
            row_ids.push(self.row_ids[r].clone());
        }
        FeatureMatrix {
            feature_names: self.feature_names.clone(),
            row_ids,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FeatureMatrix {
        FeatureMatrix::from_columns(
            vec!["f0".to_string(), "f1".to_string()],
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            &[vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 30.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_from_columns_layout() {
        let m = sample();
        assert_eq!(m.n_rows(), 3);
        assert_eq!(m.n_cols(), 2);
        assert_eq!(m.row(1), &[2.0, 20.0]);
        assert_eq!(m.column(1), vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_select_rows() {
        let m = sample().select_rows(&[2, 0]);
        assert_eq!(m.row_ids(), &["c".to_string(), "a".to_string()]);
        assert_eq!(m.row(0), &[3.0, 30.0]);
    }

    #[test]
    fn test_column_length_mismatch() {
        let result = FeatureMatrix::from_columns(
            vec!["f0".to_string()],
            vec!["a".to_string()],
            &[vec![1.0, 2.0]],
        );
        assert!(result.is_err());
    }
}
