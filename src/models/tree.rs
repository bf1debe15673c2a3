//! Regression trees fitted to gradient statistics, grown leaf-wise

use super::binning::BinnedData;
use super::params::BoosterParams;
use serde::{Deserialize, Serialize};

/// Smallest gain accepted for a split
const MIN_SPLIT_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        gain: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted tree; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// Raw (log-odds) contribution for one row
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }

    /// (feature, gain) of every split
    pub fn splits(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.nodes.iter().filter_map(|n| match n {
            Node::Split { feature, gain, .. } => Some((*feature, *gain)),
            Node::Leaf { .. } => None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    bin: usize,
    gain: f64,
    left_grad: f64,
    left_hess: f64,
}

/// Gradient, hessian and row count per bin of one feature
#[derive(Debug, Clone, PartialEq)]
struct BinHistogram {
    grad: Vec<f64>,
    hess: Vec<f64>,
    count: Vec<usize>,
}

impl BinHistogram {
    fn new(n_bins: usize) -> Self {
        Self {
            grad: vec![0.0; n_bins],
            hess: vec![0.0; n_bins],
            count: vec![0; n_bins],
        }
    }

    fn n_bins(&self) -> usize {
        self.count.len()
    }

    /// Statistics of the rows in `self` but not in `child`
    fn subtract(&self, child: &Self) -> Self {
        Self {
            grad: self.grad.iter().zip(&child.grad).map(|(p, c)| p - c).collect(),
            hess: self.hess.iter().zip(&child.hess).map(|(p, c)| p - c).collect(),
            count: self.count.iter().zip(&child.count).map(|(p, c)| p - c).collect(),
        }
    }
}

fn subtract_all(parent: &[BinHistogram], child: &[BinHistogram]) -> Vec<BinHistogram> {
    parent.iter().zip(child).map(|(p, c)| p.subtract(c)).collect()
}

struct LeafState {
    node: usize,
    rows: Vec<usize>,
    depth: usize,
    sum_grad: f64,
    sum_hess: f64,
    /// One histogram per sampled feature; kept only while the leaf can split
    histograms: Option<Vec<BinHistogram>>,
    best: Option<SplitCandidate>,
}

/// Grows one tree from first and second order gradients
pub struct TreeLearner<'a> {
    data: &'a BinnedData,
    gradients: &'a [f64],
    hessians: &'a [f64],
    params: &'a BoosterParams,
    features: &'a [usize],
}

impl<'a> TreeLearner<'a> {
    pub fn new(
        data: &'a BinnedData,
        gradients: &'a [f64],
        hessians: &'a [f64],
        params: &'a BoosterParams,
        features: &'a [usize],
    ) -> Self {
        Self {
            data,
            gradients,
            hessians,
            params,
            features,
        }
    }

    /// Grow a tree over `rows`, always splitting the leaf with the best gain
    /// until `num_leaves` is reached or no leaf can be split
    pub fn grow(&self, rows: Vec<usize>) -> Tree {
        let (sum_grad, sum_hess) = self.sums(&rows);
        let mut nodes = vec![Node::Leaf {
            value: self.leaf_output(sum_grad, sum_hess),
        }];

        let histograms = self.histograms(&rows);
        let best = self.best_split(&histograms, rows.len(), 0, sum_grad, sum_hess);
        let mut leaves = vec![LeafState {
            node: 0,
            rows,
            depth: 0,
            sum_grad,
            sum_hess,
            histograms: best.map(|_| histograms),
            best,
        }];
        let mut num_leaves = 1;

        while num_leaves < self.params.num_leaves {
            let pick = leaves
                .iter()
                .enumerate()
                .filter_map(|(i, leaf)| leaf.best.map(|b| (i, b.gain)))
                .fold(None, |acc: Option<(usize, f64)>, (i, gain)| match acc {
                    Some((_, g)) if g >= gain => acc,
                    _ => Some((i, gain)),
                });
            let Some((pick, _)) = pick else {
                break;
            };

            let leaf = leaves.swap_remove(pick);
            let Some(split) = leaf.best else {
                continue;
            };

            let column = self.data.column(split.feature);
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
                .rows
                .into_iter()
                .partition(|&r| (column[r] as usize) <= split.bin);

            let right_grad = leaf.sum_grad - split.left_grad;
            let right_hess = leaf.sum_hess - split.left_hess;

            let left = nodes.len();
            let right = left + 1;
            nodes.push(Node::Leaf {
                value: self.leaf_output(split.left_grad, split.left_hess),
            });
            nodes.push(Node::Leaf {
                value: self.leaf_output(right_grad, right_hess),
            });
            nodes[leaf.node] = Node::Split {
                feature: split.feature,
                threshold: self.data.mapper(split.feature).threshold(split.bin),
                gain: split.gain,
                left,
                right,
            };
            num_leaves += 1;

            let depth = leaf.depth + 1;
            let open = self.can_split(left_rows.len(), depth)
                || self.can_split(right_rows.len(), depth);
            // scan the smaller child, derive the larger one from its parent
            let (left_hist, right_hist) = match leaf.histograms {
                Some(parent) if open => {
                    if left_rows.len() <= right_rows.len() {
                        let small = self.histograms(&left_rows);
                        let large = subtract_all(&parent, &small);
                        (Some(small), Some(large))
                    } else {
                        let small = self.histograms(&right_rows);
                        let large = subtract_all(&parent, &small);
                        (Some(large), Some(small))
                    }
                }
                None if open => (
                    Some(self.histograms(&left_rows)),
                    Some(self.histograms(&right_rows)),
                ),
                _ => (None, None),
            };

            for (node, rows, grad, hess, histograms) in [
                (left, left_rows, split.left_grad, split.left_hess, left_hist),
                (right, right_rows, right_grad, right_hess, right_hist),
            ] {
                let best = histograms
                    .as_deref()
                    .and_then(|h| self.best_split(h, rows.len(), depth, grad, hess));
                leaves.push(LeafState {
                    node,
                    rows,
                    depth,
                    sum_grad: grad,
                    sum_hess: hess,
                    histograms: best.and(histograms),
                    best,
                });
            }
        }

        Tree { nodes }
    }

    fn sums(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter().fold((0.0, 0.0), |(g, h), &r| {
            (g + self.gradients[r], h + self.hessians[r])
        })
    }

    /// Whether a leaf of this size and depth may be split at all
    fn can_split(&self, n_rows: usize, depth: usize) -> bool {
        n_rows >= 2 * self.params.min_child_samples
            && self.params.depth_limit().map_or(true, |limit| depth < limit)
    }

    /// Per-bin gradient statistics of `rows` for every sampled feature
    fn histograms(&self, rows: &[usize]) -> Vec<BinHistogram> {
        self.features
            .iter()
            .map(|&feature| {
                let column = self.data.column(feature);
                let mut hist = BinHistogram::new(self.data.mapper(feature).n_bins());
                for &r in rows {
                    let b = column[r] as usize;
                    hist.grad[b] += self.gradients[r];
                    hist.hess[b] += self.hessians[r];
                    hist.count[b] += 1;
                }
                hist
            })
            .collect()
    }

    fn best_split(
        &self,
        histograms: &[BinHistogram],
        n_rows: usize,
        depth: usize,
        sum_grad: f64,
        sum_hess: f64,
    ) -> Option<SplitCandidate> {
        if !self.can_split(n_rows, depth) {
            return None;
        }
        let min_child = self.params.min_child_samples;
        let parent_gain = self.leaf_gain(sum_grad, sum_hess);
        let mut best: Option<SplitCandidate> = None;

        for (&feature, hist) in self.features.iter().zip(histograms) {
            let n_bins = hist.n_bins();
            if n_bins < 2 {
                continue;
            }

            let (mut left_grad, mut left_hess, mut left_count) = (0.0, 0.0, 0usize);
            for bin in 0..n_bins - 1 {
                left_grad += hist.grad[bin];
                left_hess += hist.hess[bin];
                left_count += hist.count[bin];

                let right_count = n_rows - left_count;
                if left_count < min_child {
                    continue;
                }
                if right_count < min_child {
                    break;
                }
                let right_hess = sum_hess - left_hess;
                if left_hess < self.params.min_sum_hessian
                    || right_hess < self.params.min_sum_hessian
                {
                    continue;
                }

                let gain = self.leaf_gain(left_grad, left_hess)
                    + self.leaf_gain(sum_grad - left_grad, right_hess)
                    - parent_gain;
                if gain > MIN_SPLIT_GAIN && best.map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        bin,
                        gain,
                        left_grad,
                        left_hess,
                    });
                }
            }
        }

        best
    }

    /// L1-thresholded gradient sum
    fn thresholded(&self, grad: f64) -> f64 {
        grad.signum() * (grad.abs() - self.params.lambda_l1).max(0.0)
    }

    fn leaf_gain(&self, grad: f64, hess: f64) -> f64 {
        let t = self.thresholded(grad);
        t * t / (hess + self.params.lambda_l2)
    }

    fn leaf_output(&self, grad: f64, hess: f64) -> f64 {
        let denom = hess + self.params.lambda_l2;
        if denom <= 0.0 {
            return 0.0;
        }
        -self.thresholded(grad) / denom * self.params.learning_rate
    }
}
