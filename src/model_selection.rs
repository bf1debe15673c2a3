//! Train/validation splits and K-fold partitioning over customer rows

use anyhow::{ensure, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Row indices of a train/validation split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

fn validate_test_size(n_samples: usize, test_size: f64) -> Result<usize> {
    ensure!(
        test_size > 0.0 && test_size < 1.0,
        "test_size must be between 0 and 1, got {}",
        test_size
    );
    let n_valid = (n_samples as f64 * test_size).ceil() as usize;
    ensure!(
        n_valid < n_samples,
        "Split would leave no training rows (n_samples={}, n_valid={})",
        n_samples,
        n_valid
    );
    Ok(n_valid)
}

/// Shuffled split holding out `ceil(n_samples * test_size)` rows.
///
/// The permutation only depends on `seed` and `n_samples`, so the same
/// seed over the same row order always yields the same split.
pub fn train_test_split(n_samples: usize, test_size: f64, seed: u64) -> Result<Split> {
    let n_valid = validate_test_size(n_samples, test_size)?;

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_valid);
    Ok(Split {
        train,
        valid: indices,
    })
}

/// Shuffled split that keeps the positive rate of both halves close to
/// the overall rate
pub fn stratified_train_test_split(labels: &[f64], test_size: f64, seed: u64) -> Result<Split> {
    let n_samples = labels.len();
    let n_valid = validate_test_size(n_samples, test_size)?;

    let mut positives: Vec<usize> = (0..n_samples).filter(|&i| labels[i] > 0.5).collect();
    let mut negatives: Vec<usize> = (0..n_samples).filter(|&i| labels[i] <= 0.5).collect();

    let mut rng = StdRng::seed_from_u64(seed);
    positives.shuffle(&mut rng);
    negatives.shuffle(&mut rng);

    let pos_valid = ((positives.len() as f64 * n_valid as f64 / n_samples as f64).round()
        as usize)
        .min(positives.len())
        .min(n_valid);
    let neg_valid = (n_valid - pos_valid).min(negatives.len());

    let mut valid: Vec<usize> = positives[..pos_valid]
        .iter()
        .chain(&negatives[..neg_valid])
        .copied()
        .collect();
    let mut train: Vec<usize> = positives[pos_valid..]
        .iter()
        .chain(&negatives[neg_valid..])
        .copied()
        .collect();

    valid.shuffle(&mut rng);
    train.shuffle(&mut rng);

    Ok(Split { train, valid })
}

/// K-fold cross-validator over consecutive, unshuffled folds.
///
/// The first `n_samples % n_splits` folds hold one extra row.
#[derive(Debug, Clone, Copy)]
pub struct KFold {
    n_splits: usize,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// One split per fold, the fold itself being the validation part
    pub fn split(&self, n_samples: usize) -> Result<Vec<Split>> {
        ensure!(self.n_splits >= 2, "KFold needs at least 2 folds, got {}", self.n_splits);
        ensure!(
            n_samples >= self.n_splits,
            "Cannot split {} rows into {} folds",
            n_samples,
            self.n_splits
        );

        let fold_size = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;

        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for i in 0..self.n_splits {
            let end = start + fold_size + usize::from(i < remainder);
            let train = (0..start).chain(end..n_samples).collect();
            folds.push(Split {
                train,
                valid: (start..end).collect(),
            });
            start = end;
        }

        Ok(folds)
    }
}
