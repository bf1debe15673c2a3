//! Registry of fitted per-feature compressors

use super::{FeatureCompressor, SequenceMatrix};
use crate::config::CompressionConfig;
use crate::types::frame::CustomerTable;
use crate::types::matrix::FeatureMatrix;
use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{debug, info};

/// Prefix of composite matrix columns
pub const SCORE_PREFIX: &str = "PA_";

/// Log a progress line every this many features
const PROGRESS_EVERY: usize = 25;

/// One compressor per feature, kept in table column order.
///
/// Created once from training data (or loaded from the cache), then only
/// read to transform tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressorRegistry {
    settings: CompressionConfig,
    compressors: Vec<FeatureCompressor>,
}

impl CompressorRegistry {
    /// Fit one compressor for every feature column of the table
    pub fn fit(table: &CustomerTable, settings: &CompressionConfig) -> Result<Self> {
        table.check_grouped()?;
        let groups = table.customer_groups();
        ensure!(
            groups.len() >= 2,
            "Need at least two customers to fit compressors, got {}",
            groups.len()
        );

        info!(
            features = table.n_features(),
            customers = groups.len(),
            sequence_length = settings.sequence_length,
            "Fitting per-feature compressors"
        );

        let mut compressors = Vec::with_capacity(table.n_features());
        for (j, feature) in table.feature_names().iter().enumerate() {
            let sequences = SequenceMatrix::from_groups(table, &groups, j, settings)
                .with_context(|| format!("Failed to build sequences of {}", feature))?;
            let compressor = FeatureCompressor::fit(feature, &sequences)
                .with_context(|| format!("Failed to fit compressor of {}", feature))?;

            debug!(
                feature = %feature,
                explained_variance_ratio = compressor.explained_variance_ratio(),
                "Compressor fitted"
            );
            compressors.push(compressor);

            if (j + 1) % PROGRESS_EVERY == 0 {
                info!(fitted = j + 1, total = table.n_features(), "Compression progress");
            }
        }

        Ok(Self {
            settings: settings.clone(),
            compressors,
        })
    }

    /// Composite matrix: one row per customer, one `PA_<feature>` column
    /// per registered feature
    pub fn transform(&self, table: &CustomerTable) -> Result<FeatureMatrix> {
        table.check_grouped()?;
        let groups = table.customer_groups();

        let mut columns = Vec::with_capacity(self.compressors.len());
        for compressor in &self.compressors {
            let feature = compressor.feature();
            let j = table
                .column_index(feature)
                .with_context(|| format!("Table has no column {}", feature))?;
            let sequences = SequenceMatrix::from_groups(table, &groups, j, &self.settings)
                .with_context(|| format!("Failed to build sequences of {}", feature))?;
            columns.push(compressor.transform(&sequences)?);
        }

        let names = self
            .compressors
            .iter()
            .map(|c| format!("{}{}", SCORE_PREFIX, c.feature()))
            .collect();
        let ids = groups.into_iter().map(|g| g.customer_id).collect();

        FeatureMatrix::from_columns(names, ids, &columns)
    }

    pub fn len(&self) -> usize {
        self.compressors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compressors.is_empty()
    }

    pub fn settings(&self) -> &CompressionConfig {
        &self.settings
    }

    pub fn get(&self, feature: &str) -> Option<&FeatureCompressor> {
        self.compressors.iter().find(|c| c.feature() == feature)
    }

    /// Registered features in column order
    pub fn feature_names(&self) -> Vec<String> {
        self.compressors.iter().map(|c| c.feature().to_string()).collect()
    }

    /// Explained-variance ratio of every feature, in column order
    pub fn explained_variance(&self) -> Vec<(String, f64)> {
        self.compressors
            .iter()
            .map(|c| (c.feature().to_string(), c.explained_variance_ratio()))
            .collect()
    }

    /// Persist the registry as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create model cache {}", path.display()))?;
        serde_json::to_writer(BufWriter::new(file), self)
            .with_context(|| format!("Failed to write model cache {}", path.display()))?;

        info!(path = %path.display(), features = self.len(), "Model cache saved");
        Ok(())
    }

    /// Load a registry saved by [`CompressorRegistry::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open model cache {}", path.display()))?;
        let registry: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse model cache {}", path.display()))?;

        info!(path = %path.display(), features = registry.len(), "Model cache loaded");
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CustomerTable {
        // customers a, b, c with 3, 2, 3 statements; features P_2 and B_1
        let ids = ["a", "a", "a", "b", "b", "c", "c", "c"];
        let values = vec![
            0.1, 5.0, //
            0.2, 6.0, //
            0.3, 7.0, //
            0.9, 1.0, //
            0.8, 1.0, //
            0.5, 2.0, //
            0.4, 4.0, //
            0.6, 3.0, //
        ];
        CustomerTable::new(
            vec!["P_2".to_string(), "B_1".to_string()],
            ids.iter().map(|s| s.to_string()).collect(),
            values,
        )
        .unwrap()
    }

    fn settings() -> CompressionConfig {
        CompressionConfig {
            sequence_length: 3,
            ..CompressionConfig::default()
        }
    }

    #[test]
    fn test_fit_one_compressor_per_feature() {
        let registry = CompressorRegistry::fit(&table(), &settings()).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.feature_names(), vec!["P_2", "B_1"]);
        assert!(registry.get("B_1").is_some());
        assert!(registry.get("D_39").is_none());

        for (_, ratio) in registry.explained_variance() {
            assert!((0.0..=1.0 + 1e-9).contains(&ratio));
        }
    }

    #[test]
    fn test_transform_builds_composite_matrix() {
        let t = table();
        let registry = CompressorRegistry::fit(&t, &settings()).unwrap();
        let composite = registry.transform(&t).unwrap();

        assert_eq!(composite.n_rows(), 3);
        assert_eq!(composite.row_ids(), &["a", "b", "c"]);
        assert_eq!(composite.feature_names(), &["PA_P_2", "PA_B_1"]);
    }

    #[test]
    fn test_models_are_feature_specific() {
        let t = table();
        let registry = CompressorRegistry::fit(&t, &settings()).unwrap();
        let p2 = registry.get("P_2").unwrap();
        let b1 = registry.get("B_1").unwrap();
        assert_ne!(p2.scaler(), b1.scaler());
    }

    #[test]
    fn test_transform_requires_registered_columns() {
        let t = table();
        let registry = CompressorRegistry::fit(&t, &settings()).unwrap();
        let other = t.align_columns(&["P_2".to_string()]);
        assert!(registry.transform(&other).is_err());
    }

    #[test]
    fn test_save_load_round_trip() {
        let t = table();
        let registry = CompressorRegistry::fit(&t, &settings()).unwrap();

        let dir = std::env::temp_dir().join(format!("pipeline-registry-{}", uuid::Uuid::new_v4()));
        let path = dir.join("model_score.json");
        registry.save(&path).unwrap();
        let loaded = CompressorRegistry::load(&path).unwrap();

        assert_eq!(loaded, registry);
        assert_eq!(loaded.transform(&t).unwrap(), registry.transform(&t).unwrap());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        assert!(CompressorRegistry::load("/nonexistent/model_score.json").is_err());
    }
}
