//! Submission file writer

use anyhow::{ensure, Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

/// Write `customer_ID,prediction` rows in the given order
pub fn write_submission<P: AsRef<Path>>(
    path: P,
    customer_ids: &[String],
    predictions: &[f64],
) -> Result<()> {
    let path = path.as_ref();
    ensure!(
        customer_ids.len() == predictions.len(),
        "{} customer ids but {} predictions",
        customer_ids.len(),
        predictions.len()
    );

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create submission {}", path.display()))?;
    writer.write_record(["customer_ID", "prediction"])?;
    for (id, p) in customer_ids.iter().zip(predictions) {
        writer.write_record([id.as_str(), &p.to_string()])?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = predictions.len(), "Submission written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_submission() {
        let dir = std::env::temp_dir().join(format!("pipeline-submission-{}", uuid::Uuid::new_v4()));
        let path = dir.join("submission.csv");
        write_submission(&path, &["a".to_string(), "b".to_string()], &[0.25, 0.5]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "customer_ID,prediction\na,0.25\nb,0.5\n");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let path = std::env::temp_dir().join("never-written.csv");
        assert!(write_submission(&path, &["a".to_string()], &[]).is_err());
    }
}
