//! Default Prediction Pipeline Library
//!
//! Trains a credit default classifier from monthly customer statements:
//! every feature's statement history is compressed to one principal
//! component score, and a gradient-boosted tree model is trained on the
//! compressed scores and judged with the amex metric.

pub mod compressor;
pub mod config;
pub mod metric;
pub mod model_selection;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod report;
pub mod submission;
pub mod tuning;
pub mod types;

pub use compressor::{CompressorRegistry, FeatureCompressor};
pub use config::{AppConfig, RunMode};
pub use metric::amex_metric;
pub use models::Booster;
pub use pipeline::Pipeline;
pub use report::TrainingReport;
pub use types::{CustomerTable, FeatureMatrix, Labels};
