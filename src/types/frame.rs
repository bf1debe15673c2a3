//! Raw and cleaned per-customer observation tables

use crate::config::ColumnsConfig;
use anyhow::{bail, ensure, Context, Result};
use chrono::NaiveDate;
use std::io::Read;
use std::ops::Range;
use std::path::Path;

/// Spellings treated as a missing value in addition to an empty cell
const MISSING_MARKERS: [&str; 5] = ["NaN", "nan", "NA", "null", "None"];

/// A single raw input value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Missing,
    Number(f64),
    Text(String),
}

impl Cell {
    /// Parse a raw CSV field
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || MISSING_MARKERS.contains(&trimmed) {
            return Cell::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_nan() => Cell::Missing,
            Ok(v) => Cell::Number(v),
            Err(_) => Cell::Text(trimmed.to_string()),
        }
    }

    /// Label used when the cell is one-hot encoded; `None` for missing
    pub fn category_key(&self) -> Option<String> {
        match self {
            Cell::Missing => None,
            Cell::Number(v) => Some(format!("{}", v)),
            Cell::Text(t) => Some(t.clone()),
        }
    }
}

/// One raw observation (customer statement)
#[derive(Debug, Clone)]
pub struct RawRow {
    pub customer_id: String,
    pub date: Option<NaiveDate>,
    /// Values aligned with `RawFrame::columns`
    pub cells: Vec<Cell>,
}

/// Raw observations as read from disk, before cleaning
#[derive(Debug, Clone, Default)]
pub struct RawFrame {
    /// Feature column names (customer id and date excluded)
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawFrame {
    /// Read a CSV file of observations
    pub fn from_csv<P: AsRef<Path>>(path: P, columns: &ColumnsConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open data file {}", path.display()))?;
        Self::from_reader(file, columns)
            .with_context(|| format!("Failed to read data file {}", path.display()))
    }

    /// Read observations from any CSV source
    pub fn from_reader<R: Read>(reader: R, columns: &ColumnsConfig) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .context("Failed to read CSV headers")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let id_idx = headers
            .iter()
            .position(|h| *h == columns.customer_id)
            .with_context(|| format!("Missing customer id column {:?}", columns.customer_id))?;
        let date_idx = headers
            .iter()
            .position(|h| *h == columns.date)
            .with_context(|| format!("Missing date column {:?}", columns.date))?;

        let feature_idx: Vec<usize> = (0..headers.len())
            .filter(|&i| i != id_idx && i != date_idx)
            .collect();
        let feature_columns: Vec<String> =
            feature_idx.iter().map(|&i| headers[i].clone()).collect();

        let mut rows = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result.with_context(|| format!("Failed to read CSV row {}", line + 1))?;
            ensure!(
                record.len() == headers.len(),
                "Row {} has {} fields, expected {}",
                line + 1,
                record.len(),
                headers.len()
            );

            let customer_id = record[id_idx].trim().to_string();
            ensure!(!customer_id.is_empty(), "Row {} has no customer id", line + 1);

            let date = parse_date(&record[date_idx], &columns.date_format).with_context(|| {
                format!("Invalid date on row {} (customer {})", line + 1, customer_id)
            })?;

            let cells = feature_idx.iter().map(|&i| Cell::parse(&record[i])).collect();

            rows.push(RawRow {
                customer_id,
                date,
                cells,
            });
        }

        Ok(Self {
            columns: feature_columns,
            rows,
        })
    }
}

fn parse_date(raw: &str, format: &str) -> Result<Option<NaiveDate>> {
    match Cell::parse(raw) {
        Cell::Missing => Ok(None),
        _ => NaiveDate::parse_from_str(raw.trim(), format)
            .map(Some)
            .with_context(|| format!("{:?} does not match {:?}", raw, format)),
    }
}

/// Contiguous rows belonging to one customer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerGroup {
    pub customer_id: String,
    pub rows: Range<usize>,
}

/// Cleaned numeric observations keyed by customer.
///
/// The customer id is a non-unique row key: every statement of a customer
/// stays a separate row, and rows of one customer are contiguous and in
/// chronological order.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerTable {
    feature_names: Vec<String>,
    customer_ids: Vec<String>,
    /// Row-major values
    values: Vec<f64>,
}

impl CustomerTable {
    pub fn new(feature_names: Vec<String>, customer_ids: Vec<String>, values: Vec<f64>) -> Result<Self> {
        ensure!(
            values.len() == feature_names.len() * customer_ids.len(),
            "Table holds {} values for {} rows x {} columns",
            values.len(),
            customer_ids.len(),
            feature_names.len()
        );
        Ok(Self {
            feature_names,
            customer_ids,
            values,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.customer_ids.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn customer_ids(&self) -> &[String] {
        &self.customer_ids
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let width = self.n_features();
        &self.values[row * width..(row + 1) * width]
    }

    pub fn value(&self, row: usize, column: usize) -> f64 {
        self.values[row * self.n_features() + column]
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }

    /// Runs of consecutive rows sharing a customer id, in table order
    pub fn customer_groups(&self) -> Vec<CustomerGroup> {
        let mut groups: Vec<CustomerGroup> = Vec::new();
        for (i, id) in self.customer_ids.iter().enumerate() {
            match groups.last_mut() {
                Some(group) if group.customer_id == *id => group.rows.end = i + 1,
                _ => groups.push(CustomerGroup {
                    customer_id: id.clone(),
                    rows: i..i + 1,
                }),
            }
        }
        groups
    }

    /// Reindex the columns to `names`; columns this table lacks are zero
    /// and columns not listed are dropped.
    pub fn align_columns(&self, names: &[String]) -> CustomerTable {
        let mapping: Vec<Option<usize>> = names.iter().map(|n| self.column_index(n)).collect();
        let mut values = Vec::with_capacity(self.n_rows() * names.len());
        for row in 0..self.n_rows() {
            let source = self.row(row);
            values.extend(mapping.iter().map(|m| m.map(|j| source[j]).unwrap_or(0.0)));
        }
        CustomerTable {
            feature_names: names.to_vec(),
            customer_ids: self.customer_ids.clone(),
            values,
        }
    }

    /// Fail if rows of one customer are not contiguous
    pub fn check_grouped(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for group in self.customer_groups() {
            if !seen.insert(group.customer_id.clone()) {
                bail!(
                    "Rows of customer {} are not contiguous; sort the table first",
                    group.customer_id
                );
            }
        }
        Ok(())
    }
}
