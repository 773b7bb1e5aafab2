//! Supervised risk classifier: a random forest over the same feature
//! matrix the unsupervised detectors consume, trained against labeled
//! high-risk events and normalized to the shared score/label contract.

use crate::error::{LogSentinelError, Result};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Hyperparameters for [`RiskClassifier`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskClassifierConfig {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Seed for bootstrap sampling and feature subsampling
    pub seed: u64,
}

impl Default for RiskClassifierConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 12,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
    Leaf {
        p_anomaly: f64,
    },
}

impl TreeNode {
    fn leaf(targets: &[f64], indices: &[usize]) -> Self {
        let sum: f64 = indices.iter().map(|&i| targets[i]).sum();
        TreeNode::Leaf {
            p_anomaly: sum / indices.len().max(1) as f64,
        }
    }

    fn gini(pos: f64, total: f64) -> f64 {
        if total <= 0.0 {
            return 0.0;
        }
        let p = pos / total;
        2.0 * p * (1.0 - p)
    }

    fn grow(
        x: &Array2<f64>,
        targets: &[f64],
        indices: &[usize],
        depth: usize,
        config: &RiskClassifierConfig,
        rng: &mut StdRng,
    ) -> Self {
        let n = indices.len();
        let pos: f64 = indices.iter().map(|&i| targets[i]).sum();
        let pure = pos == 0.0 || pos == n as f64;
        if depth >= config.max_depth || n < config.min_samples_split || pure {
            return Self::leaf(targets, indices);
        }

        let n_features = x.ncols();
        let mtry = ((n_features as f64).sqrt().ceil() as usize).clamp(1, n_features);
        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(rng);
        features.truncate(mtry);

        let parent_impurity = Self::gini(pos, n as f64);
        let mut best: Option<(usize, f64, f64)> = None; // (feature, threshold, gain)

        for &feature in &features {
            let mut pairs: Vec<(f64, f64)> = indices
                .iter()
                .map(|&i| (x[[i, feature]], targets[i]))
                .collect();
            pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let mut left_n = 0.0;
            let mut left_pos = 0.0;
            for k in 0..n - 1 {
                left_n += 1.0;
                left_pos += pairs[k].1;
                // Only split between distinct values
                if pairs[k].0 == pairs[k + 1].0 {
                    continue;
                }
                let right_n = n as f64 - left_n;
                let right_pos = pos - left_pos;
                let weighted = (left_n / n as f64) * Self::gini(left_pos, left_n)
                    + (right_n / n as f64) * Self::gini(right_pos, right_n);
                let gain = parent_impurity - weighted;
                if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                    let threshold = (pairs[k].0 + pairs[k + 1].0) / 2.0;
                    best = Some((feature, threshold, gain));
                }
            }
        }

        let (feature, threshold, _) = match best {
            Some(b) => b,
            None => return Self::leaf(targets, indices),
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, feature]] < threshold);
        if left_idx.is_empty() || right_idx.is_empty() {
            return Self::leaf(targets, indices);
        }

        TreeNode::Split {
            feature,
            threshold,
            left: Box::new(Self::grow(x, targets, &left_idx, depth + 1, config, rng)),
            right: Box::new(Self::grow(x, targets, &right_idx, depth + 1, config, rng)),
        }
    }

    fn probability(&self, sample: &[f64]) -> f64 {
        match self {
            TreeNode::Leaf { p_anomaly } => *p_anomaly,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] < *threshold {
                    left.probability(sample)
                } else {
                    right.probability(sample)
                }
            }
        }
    }
}

/// Random-forest risk classifier. Labels use the shared +1/-1 convention
/// (-1 = high-risk/anomalous); scores are `p(normal) - p(anomalous)` so
/// lower still means more anomalous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskClassifier {
    config: RiskClassifierConfig,
    trees: Option<Vec<TreeNode>>,
}

impl RiskClassifier {
    pub fn new(config: RiskClassifierConfig) -> Self {
        Self {
            config,
            trees: None,
        }
    }

    /// Fit against ground-truth labels in the +1/-1 convention
    pub fn fit_supervised(&mut self, x: &Array2<f64>, y: &Array1<i32>) -> Result<()> {
        let n = x.nrows();
        if n == 0 {
            return Err(LogSentinelError::Data(
                "cannot fit risk classifier on an empty matrix".to_string(),
            ));
        }
        if y.len() != n {
            return Err(LogSentinelError::Shape {
                expected: format!("{n} labels"),
                actual: format!("{}", y.len()),
            });
        }
        for (i, &label) in y.iter().enumerate() {
            if label != 1 && label != -1 {
                return Err(LogSentinelError::InvalidParameter {
                    name: "y".to_string(),
                    value: label.to_string(),
                    reason: format!("label at row {i} must be +1 or -1"),
                });
            }
        }

        let targets: Vec<f64> = y.iter().map(|&l| if l == -1 { 1.0 } else { 0.0 }).collect();
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        // Bootstrap sample per tree; seeds drawn up front so tree
        // construction stays deterministic
        let tree_seeds: Vec<u64> = (0..self.config.n_estimators).map(|_| rng.gen()).collect();

        let config = self.config.clone();
        let trees: Vec<TreeNode> = tree_seeds
            .into_par_iter()
            .map(|seed| {
                let mut tree_rng = StdRng::seed_from_u64(seed);
                let indices: Vec<usize> =
                    (0..n).map(|_| tree_rng.gen_range(0..n)).collect();
                TreeNode::grow(x, &targets, &indices, 0, &config, &mut tree_rng)
            })
            .collect();

        info!(n_trees = trees.len(), "fitted risk classifier");
        self.trees = Some(trees);
        Ok(())
    }

    /// Forest vote fraction for the anomalous class, per row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let trees = self.trees.as_ref().ok_or(LogSentinelError::NotFitted)?;

        let probs: Vec<f64> = x
            .rows()
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|row| {
                let sample: Vec<f64> = row.iter().copied().collect();
                trees.iter().map(|t| t.probability(&sample)).sum::<f64>() / trees.len() as f64
            })
            .collect();

        Ok(Array1::from_vec(probs))
    }

    /// Signed score in [-1, 1]: `p(normal) - p(anomalous)`
    pub fn score_samples(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict_proba(x)?.mapv(|p| 1.0 - 2.0 * p))
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<i32>> {
        Ok(self
            .predict_proba(x)?
            .mapv(|p| if p > 0.5 { -1 } else { 1 }))
    }
}

impl Default for RiskClassifier {
    fn default() -> Self {
        Self::new(RiskClassifierConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (Array2<f64>, Array1<i32>) {
        // Low feature values are normal, high values are high-risk
        let mut data = Vec::new();
        let mut labels = Vec::new();
        for i in 0..30 {
            data.push((i % 5) as f64 * 0.1);
            data.push((i % 3) as f64 * 0.1);
            labels.push(1);
        }
        for i in 0..10 {
            data.push(5.0 + (i % 3) as f64 * 0.1);
            data.push(5.0 + (i % 2) as f64 * 0.1);
            labels.push(-1);
        }
        (
            Array2::from_shape_vec((40, 2), data).unwrap(),
            Array1::from_vec(labels),
        )
    }

    #[test]
    fn test_learns_separable_risk() {
        let (x, y) = separable();
        let mut clf = RiskClassifier::new(RiskClassifierConfig {
            n_estimators: 25,
            ..RiskClassifierConfig::default()
        });
        clf.fit_supervised(&x, &y).unwrap();

        let pred = clf.predict(&x).unwrap();
        let correct = pred
            .iter()
            .zip(y.iter())
            .filter(|(p, t)| p == t)
            .count();
        assert!(correct as f64 >= 0.9 * y.len() as f64);

        // Lower score = more anomalous
        let scores = clf.score_samples(&x).unwrap();
        assert!(scores[35] < scores[0]);
    }

    #[test]
    fn test_rejects_bad_labels() {
        let (x, _) = separable();
        let y = Array1::from_elem(x.nrows(), 3);
        let mut clf = RiskClassifier::default();
        assert!(matches!(
            clf.fit_supervised(&x, &y).unwrap_err(),
            LogSentinelError::InvalidParameter { .. }
        ));
    }

    #[test]
    fn test_rejects_row_mismatch() {
        let (x, _) = separable();
        let y = Array1::from_elem(3, 1);
        let mut clf = RiskClassifier::default();
        assert!(matches!(
            clf.fit_supervised(&x, &y).unwrap_err(),
            LogSentinelError::Shape { .. }
        ));
    }

    #[test]
    fn test_deterministic_under_seed() {
        let (x, y) = separable();
        let config = RiskClassifierConfig {
            n_estimators: 10,
            ..RiskClassifierConfig::default()
        };
        let mut a = RiskClassifier::new(config.clone());
        let mut b = RiskClassifier::new(config);
        a.fit_supervised(&x, &y).unwrap();
        b.fit_supervised(&x, &y).unwrap();

        let pa = a.predict_proba(&x).unwrap();
        let pb = b.predict_proba(&x).unwrap();
        for (u, v) in pa.iter().zip(pb.iter()) {
            assert_eq!(u, v);
        }
    }
}
