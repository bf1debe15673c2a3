//! Synthetic Statement Generator
//!
//! Writes train/test statement files and training labels shaped like the
//! real data, for trying out the pipeline end to end.

use anyhow::{Context, Result};
use chrono::{Months, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const NUMERIC_COLUMNS: [&str; 7] = ["P_2", "B_1", "B_2", "D_39", "R_1", "S_3", "D_73"];
const CATEGORICAL_COLUMNS: [(&str, &[&str]); 3] = [
    ("D_63", &["CO", "CR", "CL", "XZ"]),
    ("D_64", &["O", "U", "R", "-1"]),
    ("B_30", &["0", "1", "2"]),
];

/// Statement generator for one population of customers
struct StatementGenerator {
    rng: StdRng,
    first_statement: NaiveDate,
    missing_rate: f64,
}

struct Customer {
    id: String,
    defaulted: bool,
    statements: Vec<Vec<String>>,
}

impl StatementGenerator {
    fn new(seed: u64, missing_rate: f64) -> Result<Self> {
        let first_statement =
            NaiveDate::from_ymd_opt(2017, 3, 1).context("Invalid first statement date")?;
        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            first_statement,
            missing_rate,
        })
    }

    /// One customer with 1 to 13 monthly statements; defaulters drift
    /// towards lower payment and higher balance values
    fn customer(&mut self, prefix: &str, index: usize, default_rate: f64) -> Customer {
        let defaulted = self.rng.gen_bool(default_rate);
        let n_statements = self.rng.gen_range(1..=13);
        let risk = if defaulted { 1.0 } else { 0.0 };
        let trend: f64 = self.rng.gen_range(0.0..0.05);

        let statements = (0..n_statements)
            .map(|month| {
                let date = self
                    .first_statement
                    .checked_add_months(Months::new(month))
                    .unwrap_or(self.first_statement);
                let drift = trend * month as f64 * (2.0 * risk - 1.0);

                let mut row = vec![
                    format!("{}{:06}", prefix, index),
                    date.format("%Y-%m-%d").to_string(),
                ];
                for (j, _) in NUMERIC_COLUMNS.iter().enumerate() {
                    if self.rng.gen_bool(self.missing_rate) {
                        row.push(String::new());
                        continue;
                    }
                    let signal = match j {
                        0 => 0.75 - 0.35 * risk - drift,
                        1 | 2 => 0.1 + 0.3 * risk + drift,
                        _ => 0.0,
                    };
                    let noise: f64 = self.rng.gen_range(-0.2..0.2);
                    row.push(format!("{:.6}", signal + noise));
                }
                for (_, values) in CATEGORICAL_COLUMNS {
                    if self.rng.gen_bool(self.missing_rate) {
                        row.push(String::new());
                    } else {
                        row.push(values[self.rng.gen_range(0..values.len())].to_string());
                    }
                }
                row
            })
            .collect();

        Customer {
            id: format!("{}{:06}", prefix, index),
            defaulted,
            statements,
        }
    }
}

fn header() -> Vec<&'static str> {
    let mut header = vec!["customer_ID", "S_2"];
    header.extend(NUMERIC_COLUMNS);
    header.extend(CATEGORICAL_COLUMNS.iter().map(|(name, _)| *name));
    header
}

fn write_statements(path: &Path, customers: &[Customer]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(header())?;
    for customer in customers {
        for row in &customer.statements {
            writer.write_record(row)?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn write_labels(path: &Path, customers: &[Customer]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(["customer_ID", "target"])?;
    for customer in customers {
        writer.write_record([customer.id.as_str(), if customer.defaulted { "1" } else { "0" }])?;
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("synth_data=info".parse()?),
        )
        .init();

    info!("Starting Synthetic Statement Generator");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let out_dir = PathBuf::from(args.get(1).map(|s| s.as_str()).unwrap_or("data"));
    let n_train: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(2000);
    let n_test: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(500);
    let default_rate: f64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0.25);
    let seed: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(42);

    info!(
        out_dir = %out_dir.display(),
        n_train,
        n_test,
        default_rate,
        seed,
        "Configuration loaded"
    );

    fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let mut generator = StatementGenerator::new(seed, 0.05)?;
    let train: Vec<Customer> = (0..n_train)
        .map(|i| generator.customer("train_", i, default_rate))
        .collect();
    let test: Vec<Customer> = (0..n_test)
        .map(|i| generator.customer("test_", i, default_rate))
        .collect();

    write_statements(&out_dir.join("train_data.csv"), &train)?;
    write_labels(&out_dir.join("train_labels.csv"), &train)?;
    write_statements(&out_dir.join("test_data.csv"), &test)?;

    let defaulted = train.iter().filter(|c| c.defaulted).count();
    let statements: usize = train.iter().map(|c| c.statements.len()).sum();
    info!(
        customers = train.len(),
        defaulted,
        statements,
        test_customers = test.len(),
        "Synthetic data written"
    );

    Ok(())
}
