//! Default Prediction Pipeline - Main Entry Point
//!
//! Cleans statement data, compresses every feature's history, trains the
//! booster and writes the submission and training report.

use anyhow::Result;
use default_prediction_pipeline::{config::AppConfig, pipeline::Pipeline};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Optional config path as the only argument
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load_from_path(PathBuf::from(path))?,
        None => AppConfig::load()?,
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!(
            "default_prediction_pipeline={}",
            config.logging.level
        ))
    })?;
    if config.logging.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting Default Prediction Pipeline");
    info!(
        mode = ?config.run.mode,
        train_data = %config.paths.train_data.display(),
        sequence_length = config.compression.sequence_length,
        "Configuration loaded successfully"
    );

    let report = Pipeline::new(config).run()?;

    info!(
        run_id = %report.run_id,
        valid_score = report.valid_score,
        "Pipeline finished"
    );
    Ok(())
}
