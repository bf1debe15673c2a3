//! Binary default labels keyed by customer

use anyhow::{bail, ensure, Context, Result};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

/// Customer id to default flag (0 = paid, 1 = defaulted), sorted by id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Labels {
    entries: BTreeMap<String, u8>,
}

impl Labels {
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, u8)>,
        S: Into<String>,
    {
        let mut entries = BTreeMap::new();
        for (id, target) in pairs {
            let id = id.into();
            ensure!(target <= 1, "Label of customer {} is {}, expected 0 or 1", id, target);
            if entries.insert(id.clone(), target).is_some() {
                bail!("Customer {} is labelled twice", id);
            }
        }
        Ok(Self { entries })
    }

    /// Read labels from a CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P, id_column: &str, label_column: &str) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open label file {}", path.display()))?;
        Self::from_reader(file, id_column, label_column)
            .with_context(|| format!("Failed to read label file {}", path.display()))
    }

    pub fn from_reader<R: Read>(reader: R, id_column: &str, label_column: &str) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = rdr.headers().context("Failed to read CSV headers")?.clone();

        let id_idx = headers
            .iter()
            .position(|h| h.trim() == id_column)
            .with_context(|| format!("Missing customer id column {:?}", id_column))?;
        let label_idx = headers
            .iter()
            .position(|h| h.trim() == label_column)
            .with_context(|| format!("Missing label column {:?}", label_column))?;

        let mut pairs = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result.with_context(|| format!("Failed to read CSV row {}", line + 1))?;
            let id = record
                .get(id_idx)
                .context("Short label row")?
                .trim()
                .to_string();
            let raw = record.get(label_idx).context("Short label row")?.trim();
            let target: u8 = raw
                .parse::<f64>()
                .ok()
                .filter(|v| *v == 0.0 || *v == 1.0)
                .map(|v| v as u8)
                .with_context(|| format!("Label {:?} of customer {} is not 0 or 1", raw, id))?;
            pairs.push((id, target));
        }

        Self::from_pairs(pairs)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, customer_id: &str) -> Option<u8> {
        self.entries.get(customer_id).copied()
    }

    pub fn positive_count(&self) -> usize {
        self.entries.values().filter(|&&t| t == 1).count()
    }

    /// Labels in the order of `customer_ids`; every customer must be labelled
    pub fn aligned(&self, customer_ids: &[String]) -> Result<Vec<f64>> {
        customer_ids
            .iter()
            .map(|id| {
                self.get(id)
                    .map(f64::from)
                    .with_context(|| format!("Customer {} has no label", id))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_from_reader() {
        let csv = "customer_ID,target\nb,1\na,0\nc,1\n";
        let labels = Labels::from_reader(csv.as_bytes(), "customer_ID", "target").unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.positive_count(), 2);
        assert_eq!(labels.get("a"), Some(0));
    }

    #[test]
    fn test_aligned_follows_given_order() {
        let labels = Labels::from_pairs(vec![("a", 0), ("b", 1)]).unwrap();
        let ids = vec!["b".to_string(), "a".to_string()];
        assert_eq!(labels.aligned(&ids).unwrap(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_aligned_missing_customer() {
        let labels = Labels::from_pairs(vec![("a", 0)]).unwrap();
        assert!(labels.aligned(&["z".to_string()]).is_err());
    }

    #[test]
    fn test_rejects_non_binary_label() {
        let csv = "customer_ID,target\na,2\n";
        assert!(Labels::from_reader(csv.as_bytes(), "customer_ID", "target").is_err());
    }

    #[test]
    fn test_rejects_duplicate_customer() {
        assert!(Labels::from_pairs(vec![("a", 0), ("a", 1)]).is_err());
    }
}
