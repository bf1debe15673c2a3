//! Histogram binning of feature values

use crate::types::matrix::FeatureMatrix;
use serde::{Deserialize, Serialize};

/// Maps one feature's values to at most `max_bin` ordered bins.
///
/// Bin `b` holds values `v` with `upper_bounds[b - 1] < v <= upper_bounds[b]`;
/// the last bound is infinite so every value has a bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinMapper {
    upper_bounds: Vec<f64>,
}

impl BinMapper {
    pub fn fit(values: &[f64], max_bin: usize) -> Self {
        let max_bin = max_bin.max(2);
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(f64::total_cmp);

        let mut distinct = sorted.clone();
        distinct.dedup();

        let mut upper_bounds = if distinct.len() <= 1 {
            Vec::new()
        } else if distinct.len() <= max_bin {
            distinct.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
        } else {
            let max = distinct[distinct.len() - 1];
            let mut bounds: Vec<f64> = (1..max_bin)
                .map(|k| sorted[k * sorted.len() / max_bin])
                .filter(|&b| b < max)
                .collect();
            bounds.dedup();
            bounds
        };
        upper_bounds.push(f64::INFINITY);

        Self { upper_bounds }
    }

    pub fn n_bins(&self) -> usize {
        self.upper_bounds.len()
    }

    pub fn bin(&self, value: f64) -> u8 {
        self.upper_bounds.partition_point(|&b| b < value) as u8
    }

    /// Split threshold of "bin <= b": values `<=` it go left
    pub fn threshold(&self, bin: usize) -> f64 {
        self.upper_bounds[bin]
    }
}

/// Column-major binned copy of a feature matrix
#[derive(Debug, Clone)]
pub struct BinnedData {
    n_rows: usize,
    columns: Vec<Vec<u8>>,
    mappers: Vec<BinMapper>,
}

impl BinnedData {
    pub fn from_matrix(matrix: &FeatureMatrix, max_bin: usize) -> Self {
        let mut columns = Vec::with_capacity(matrix.n_cols());
        let mut mappers = Vec::with_capacity(matrix.n_cols());

        for j in 0..matrix.n_cols() {
            let values = matrix.column(j);
            let mapper = BinMapper::fit(&values, max_bin);
            columns.push(values.iter().map(|&v| mapper.bin(v)).collect());
            mappers.push(mapper);
        }

        Self {
            n_rows: matrix.n_rows(),
            columns,
            mappers,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, feature: usize) -> &[u8] {
        &self.columns[feature]
    }

    pub fn mapper(&self, feature: usize) -> &BinMapper {
        &self.mappers[feature]
    }
}
