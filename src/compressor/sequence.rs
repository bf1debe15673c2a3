//! Fixed-length customer sequences for a single feature

use crate::config::CompressionConfig;
use crate::types::frame::{CustomerGroup, CustomerTable};
use anyhow::{bail, ensure, Result};
use serde::{Deserialize, Serialize};

/// Handling of customers with more statements than the sequence length
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Keep the most recent statements
    #[default]
    KeepLatest,
    /// Fail the run
    Reject,
}

/// One feature's history: a (customers x length) matrix, left-padded with
/// zeros for customers with fewer statements
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceMatrix {
    customer_ids: Vec<String>,
    length: usize,
    values: Vec<f64>,
}

impl SequenceMatrix {
    /// Build the sequences of `column` for every customer in the table
    pub fn from_column(
        table: &CustomerTable,
        column: usize,
        settings: &CompressionConfig,
    ) -> Result<Self> {
        Self::from_groups(table, &table.customer_groups(), column, settings)
    }

    /// Build the sequences of `column` from precomputed customer groups
    pub fn from_groups(
        table: &CustomerTable,
        groups: &[CustomerGroup],
        column: usize,
        settings: &CompressionConfig,
    ) -> Result<Self> {
        let length = settings.sequence_length;
        ensure!(length > 0, "Sequence length must be positive");
        ensure!(
            column < table.n_features(),
            "Column {} out of range for {} features",
            column,
            table.n_features()
        );

        let mut values = vec![0.0; groups.len() * length];
        let mut customer_ids = Vec::with_capacity(groups.len());

        for (i, group) in groups.iter().enumerate() {
            let count = group.rows.len();
            let rows = if count > length {
                match settings.overflow {
                    OverflowPolicy::KeepLatest => group.rows.end - length..group.rows.end,
                    OverflowPolicy::Reject => bail!(
                        "Customer {} has {} statements, more than the sequence length {}",
                        group.customer_id,
                        count,
                        length
                    ),
                }
            } else {
                group.rows.clone()
            };

            let offset = i * length + (length - rows.len());
            for (k, row) in rows.enumerate() {
                values[offset + k] = table.value(row, column);
            }
            customer_ids.push(group.customer_id.clone());
        }

        Ok(Self {
            customer_ids,
            length,
            values,
        })
    }

    /// Build directly from padded rows
    pub fn from_rows(customer_ids: Vec<String>, length: usize, values: Vec<f64>) -> Result<Self> {
        ensure!(
            values.len() == customer_ids.len() * length,
            "{} values for {} customers of length {}",
            values.len(),
            customer_ids.len(),
            length
        );
        Ok(Self {
            customer_ids,
            length,
            values,
        })
    }

    pub fn customer_ids(&self) -> &[String] {
        &self.customer_ids
    }

    pub fn n_customers(&self) -> usize {
        self.customer_ids.len()
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Row-major values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn row(&self, customer: usize) -> &[f64] {
        &self.values[customer * self.length..(customer + 1) * self.length]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(ids: &[&str], values: &[f64]) -> CustomerTable {
        CustomerTable::new(
            vec!["P_2".to_string()],
            ids.iter().map(|s| s.to_string()).collect(),
            values.to_vec(),
        )
        .unwrap()
    }

    fn settings(length: usize, overflow: OverflowPolicy) -> CompressionConfig {
        CompressionConfig {
            sequence_length: length,
            overflow,
        }
    }

    #[test]
    fn test_left_pads_short_histories() {
        let t = table(&["a", "a", "b"], &[1.0, 2.0, 3.0]);
        let seq = SequenceMatrix::from_column(&t, 0, &settings(4, OverflowPolicy::KeepLatest))
            .unwrap();

        assert_eq!(seq.n_customers(), 2);
        assert_eq!(seq.row(0), &[0.0, 0.0, 1.0, 2.0]);
        assert_eq!(seq.row(1), &[0.0, 0.0, 0.0, 3.0]);
    }

    #[test]
    fn test_full_history_unchanged() {
        let values: Vec<f64> = (1..=13).map(f64::from).collect();
        let t = table(&["a"; 13], &values);
        let seq =
            SequenceMatrix::from_column(&t, 0, &CompressionConfig::default()).unwrap();
        assert_eq!(seq.row(0), values.as_slice());
    }

    #[test]
    fn test_overflow_keeps_latest() {
        let t = table(&["a", "a", "a"], &[1.0, 2.0, 3.0]);
        let seq = SequenceMatrix::from_column(&t, 0, &settings(2, OverflowPolicy::KeepLatest))
            .unwrap();
        assert_eq!(seq.row(0), &[2.0, 3.0]);
    }

    #[test]
    fn test_overflow_reject() {
        let t = table(&["a", "a", "a"], &[1.0, 2.0, 3.0]);
        let result = SequenceMatrix::from_column(&t, 0, &settings(2, OverflowPolicy::Reject));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_rows_shape_check() {
        assert!(SequenceMatrix::from_rows(vec!["a".to_string()], 3, vec![1.0]).is_err());
    }
}
