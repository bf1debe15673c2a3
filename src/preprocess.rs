//! Cleaning of raw statements into a numeric per-customer table.
//!
//! Rows are ordered by (customer, statement date), missing numbers become
//! zero, deny-listed columns are removed and allow-listed categorical
//! columns are one-hot encoded. The customer id stays the row key, so every
//! statement keeps its own row.

use crate::config::PreprocessingConfig;
use crate::types::frame::{Cell, CustomerTable, RawFrame};
use anyhow::{bail, Result};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{debug, info};

/// Applies the configured cleaning steps to a raw frame
pub struct Preprocessor {
    categorical_columns: Vec<String>,
    drop_columns: HashSet<String>,
}

impl Preprocessor {
    pub fn new(config: &PreprocessingConfig) -> Self {
        Self {
            categorical_columns: config.categorical_columns.clone(),
            drop_columns: config.drop_columns.iter().cloned().collect(),
        }
    }

    /// Clean a raw frame into a numeric table
    pub fn clean(&self, mut raw: RawFrame) -> Result<CustomerTable> {
        raw.rows.sort_by(|a, b| {
            a.customer_id
                .cmp(&b.customer_id)
                .then_with(|| compare_dates(a.date, b.date))
        });

        let dropped: Vec<&String> = raw
            .columns
            .iter()
            .filter(|c| self.drop_columns.contains(*c))
            .collect();
        if !dropped.is_empty() {
            debug!(columns = ?dropped, "Dropping deny-listed columns");
        }

        let is_categorical = |name: &String| self.categorical_columns.contains(name);
        let numeric: Vec<usize> = (0..raw.columns.len())
            .filter(|&j| {
                let name = &raw.columns[j];
                !self.drop_columns.contains(name) && !is_categorical(name)
            })
            .collect();

        // Encoded in allow-list order, after the numeric columns
        let mut encoded: Vec<(usize, Vec<String>)> = Vec::new();
        for name in &self.categorical_columns {
            if self.drop_columns.contains(name) {
                continue;
            }
            match raw.columns.iter().position(|c| c == name) {
                Some(j) => encoded.push((j, categories(&raw, j))),
                None => debug!(column = %name, "Categorical column not present"),
            }
        }

        let mut feature_names: Vec<String> =
            numeric.iter().map(|&j| raw.columns[j].clone()).collect();
        for (j, cats) in &encoded {
            feature_names.extend(cats.iter().map(|c| format!("{}_{}", raw.columns[*j], c)));
        }

        let width = feature_names.len();
        let mut values = Vec::with_capacity(raw.rows.len() * width);
        let mut customer_ids = Vec::with_capacity(raw.rows.len());

        for row in &raw.rows {
            for &j in &numeric {
                let value = match &row.cells[j] {
                    Cell::Missing => 0.0,
                    Cell::Number(v) => *v,
                    Cell::Text(t) => bail!(
                        "Column {} holds non-numeric value {:?} for customer {}",
                        raw.columns[j],
                        t,
                        row.customer_id
                    ),
                };
                values.push(value);
            }

            for (j, cats) in &encoded {
                let key = row.cells[*j].category_key();
                values.extend(
                    cats.iter()
                        .map(|c| if key.as_deref() == Some(c.as_str()) { 1.0 } else { 0.0 }),
                );
            }

            customer_ids.push(row.customer_id.clone());
        }

        let table = CustomerTable::new(feature_names, customer_ids, values)?;

        info!(
            rows = table.n_rows(),
            customers = table.customer_groups().len(),
            features = table.n_features(),
            "Preprocessed observations"
        );

        Ok(table)
    }
}

/// Observations without a date sort after dated ones
fn compare_dates(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Distinct non-missing values of a column, numbers ordered numerically
fn categories(raw: &RawFrame, column: usize) -> Vec<String> {
    let mut seen: Vec<&Cell> = Vec::new();
    for row in &raw.rows {
        let cell = &row.cells[column];
        if *cell != Cell::Missing && !seen.contains(&cell) {
            seen.push(cell);
        }
    }

    seen.sort_by(|a, b| match (a, b) {
        (Cell::Number(x), Cell::Number(y)) => x.total_cmp(y),
        (Cell::Number(_), Cell::Text(_)) => Ordering::Less,
        (Cell::Text(_), Cell::Number(_)) => Ordering::Greater,
        (Cell::Text(x), Cell::Text(y)) => x.cmp(y),
        _ => Ordering::Equal,
    });

    seen.into_iter().filter_map(Cell::category_key).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnsConfig, PreprocessingConfig};

    fn preprocessor() -> Preprocessor {
        Preprocessor::new(&PreprocessingConfig {
            categorical_columns: vec!["D_63".to_string(), "B_30".to_string()],
            drop_columns: vec!["S_2".to_string(), "D_87".to_string()],
        })
    }

    fn clean(csv: &str) -> CustomerTable {
        let raw = RawFrame::from_reader(csv.as_bytes(), &ColumnsConfig::default()).unwrap();
        preprocessor().clean(raw).unwrap()
    }

    #[test]
    fn test_sorts_by_customer_then_date() {
        let table = clean(
            "customer_ID,S_2,P_2\n\
             b,2017-05-01,3\n\
             a,2017-04-01,2\n\
             a,2017-03-01,1\n\
             a,,9\n",
        );
        assert_eq!(table.customer_ids(), &["a", "a", "a", "b"]);
        let column: Vec<f64> = (0..4).map(|i| table.value(i, 0)).collect();
        assert_eq!(column, vec![1.0, 2.0, 9.0, 3.0]);
    }

    #[test]
    fn test_drops_deny_listed_columns() {
        let table = clean("customer_ID,S_2,P_2,D_87\na,2017-03-01,1,5\n");
        assert_eq!(table.feature_names(), &["P_2".to_string()]);
    }

    #[test]
    fn test_one_hot_encoding() {
        let table = clean(
            "customer_ID,S_2,P_2,D_63,B_30\n\
             a,2017-03-01,1,CR,2\n\
             a,2017-04-01,1,CO,0\n\
             b,2017-03-01,1,CR,\n",
        );
        assert_eq!(
            table.feature_names(),
            &["P_2", "D_63_CO", "D_63_CR", "B_30_0", "B_30_2"]
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()[..]
        );
        assert_eq!(table.row(0), &[1.0, 0.0, 1.0, 0.0, 1.0]);
        assert_eq!(table.row(1), &[1.0, 1.0, 0.0, 1.0, 0.0]);
        assert_eq!(table.row(2), &[1.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_all_missing_row_is_zero() {
        let table = clean(
            "customer_ID,S_2,P_2,B_1,D_63,B_30\n\
             a,2017-03-01,0.5,2,CR,1\n\
             b,2017-03-01,,,,\n",
        );
        assert_eq!(table.customer_ids()[1], "b");
        assert!(table.row(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_text_in_numeric_column_fails() {
        let raw = RawFrame::from_reader(
            "customer_ID,S_2,P_2\na,2017-03-01,high\n".as_bytes(),
            &ColumnsConfig::default(),
        )
        .unwrap();
        assert!(preprocessor().clean(raw).is_err());
    }

    #[test]
    fn test_numeric_categories_sort_numerically() {
        let table = clean(
            "customer_ID,S_2,B_30\n\
             a,2017-03-01,10\n\
             b,2017-03-01,9\n",
        );
        assert_eq!(table.feature_names(), &["B_30_9".to_string(), "B_30_10".to_string()]);
    }
}
