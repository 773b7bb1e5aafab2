//! Isolation forest anomaly detection.
//!
//! Scores follow the shared decision convention: lower = more anomalous,
//! negative = past the contamination threshold learned during fit.

use crate::error::{LogSentinelError, Result};
use super::AnomalyDetector;
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Hyperparameters for [`IsolationForest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForestConfig {
    /// Number of trees
    pub n_estimators: usize,
    /// Subsample size per tree
    pub max_samples: usize,
    /// Expected fraction of anomalies in the training data
    pub contamination: f64,
    /// Seed for the stochastic tree construction
    pub seed: u64,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.02,
            seed: 42,
        }
    }
}

/// One tree of the forest
#[derive(Debug, Clone, Serialize, Deserialize)]
enum IsoNode {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<IsoNode>,
        right: Box<IsoNode>,
    },
    Leaf {
        size: usize,
    },
}

impl IsoNode {
    fn grow(
        x: &Array2<f64>,
        indices: &[usize],
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> Self {
        let n_samples = indices.len();
        if depth >= max_depth || n_samples <= 1 {
            return IsoNode::Leaf { size: n_samples };
        }

        let feature = rng.gen_range(0..x.ncols());
        let values: Vec<f64> = indices.iter().map(|&i| x[[i, feature]]).collect();
        let min_val = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_val = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        if (max_val - min_val).abs() < 1e-12 {
            return IsoNode::Leaf { size: n_samples };
        }

        let threshold = rng.gen_range(min_val..max_val);
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| x[[i, feature]] < threshold);

        if left_idx.is_empty() || right_idx.is_empty() {
            return IsoNode::Leaf { size: n_samples };
        }

        IsoNode::Split {
            feature,
            threshold,
            left: Box::new(Self::grow(x, &left_idx, depth + 1, max_depth, rng)),
            right: Box::new(Self::grow(x, &right_idx, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(&self, sample: &[f64], depth: usize) -> f64 {
        match self {
            IsoNode::Leaf { size } => depth as f64 + Self::c(*size),
            IsoNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] < *threshold {
                    left.path_length(sample, depth + 1)
                } else {
                    right.path_length(sample, depth + 1)
                }
            }
        }
    }

    /// Average path length of an unsuccessful BST search:
    /// c(n) = 2 H(n-1) - 2(n-1)/n
    fn c(n: usize) -> f64 {
        if n <= 1 {
            0.0
        } else if n == 2 {
            1.0
        } else {
            let n_f = n as f64;
            2.0 * ((n_f - 1.0).ln() + 0.5772156649) - 2.0 * (n_f - 1.0) / n_f
        }
    }
}

/// Isolation forest: shorter expected path length means easier to
/// isolate, which means more anomalous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    config: IsolationForestConfig,
    trees: Option<Vec<IsoNode>>,
    subsample_size: Option<usize>,
    /// Contamination quantile of the raw isolation measure over the
    /// training data; decision score = offset - raw
    offset: Option<f64>,
}

impl IsolationForest {
    pub fn new(config: IsolationForestConfig) -> Self {
        Self {
            config,
            trees: None,
            subsample_size: None,
            offset: None,
        }
    }

    /// Raw isolation measure s(x) = 2^(-E[h(x)] / c(n)), in (0, 1],
    /// higher = more anomalous
    fn raw_scores(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let trees = self.trees.as_ref().ok_or(LogSentinelError::NotFitted)?;
        let c_n = IsoNode::c(self.subsample_size.unwrap_or(256));

        let scores: Vec<f64> = x
            .rows()
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|row| {
                let sample: Vec<f64> = row.iter().copied().collect();
                let avg_path: f64 = trees
                    .iter()
                    .map(|tree| tree.path_length(&sample, 0))
                    .sum::<f64>()
                    / trees.len() as f64;
                2.0_f64.powf(-avg_path / c_n)
            })
            .collect();

        Ok(Array1::from_vec(scores))
    }
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new(IsolationForestConfig::default())
    }
}

impl AnomalyDetector for IsolationForest {
    fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(LogSentinelError::Data(
                "cannot fit isolation forest on an empty matrix".to_string(),
            ));
        }

        let subsample = self.config.max_samples.min(n_samples);
        let max_depth = (subsample as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let mut trees = Vec::with_capacity(self.config.n_estimators);
        for _ in 0..self.config.n_estimators {
            let indices: Vec<usize> = (0..subsample)
                .map(|_| rng.gen_range(0..n_samples))
                .collect();
            trees.push(IsoNode::grow(x, &indices, 0, max_depth, &mut rng));
        }

        self.trees = Some(trees);
        self.subsample_size = Some(subsample);

        // Offset at the contamination quantile of the training measure
        let raw = self.raw_scores(x)?;
        let mut sorted: Vec<f64> = raw.iter().copied().collect();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        let cutoff = ((self.config.contamination * n_samples as f64) as usize).min(n_samples - 1);
        self.offset = Some(sorted[cutoff]);

        info!(
            n_trees = self.config.n_estimators,
            subsample, "fitted isolation forest"
        );
        Ok(())
    }

    fn score_samples(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let offset = self.offset.ok_or(LogSentinelError::NotFitted)?;
        let raw = self.raw_scores(x)?;
        Ok(raw.mapv(|s| offset - s))
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i32>> {
        let scores = self.score_samples(x)?;
        Ok(scores.mapv(|s| if s < 0.0 { -1 } else { 1 }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered_with_outliers() -> Array2<f64> {
        // 50 points in a tight band plus 2 far outliers
        let mut data = Vec::new();
        for i in 0..50 {
            data.push((i % 10) as f64);
            data.push(((i % 10) + 1) as f64);
        }
        data.extend_from_slice(&[100.0, 100.0]);
        data.extend_from_slice(&[-50.0, -50.0]);
        Array2::from_shape_vec((52, 2), data).unwrap()
    }

    #[test]
    fn test_outliers_score_lower() {
        let x = clustered_with_outliers();
        let mut forest = IsolationForest::new(IsolationForestConfig {
            n_estimators: 50,
            contamination: 0.05,
            ..IsolationForestConfig::default()
        });
        forest.fit(&x).unwrap();

        let scores = forest.score_samples(&x).unwrap();
        // Lower score = more anomalous
        assert!(scores[50] < scores[0]);
        assert!(scores[51] < scores[0]);

        let labels = forest.predict(&x).unwrap();
        assert_eq!(labels[50], -1);
        assert_eq!(labels[51], -1);
    }

    #[test]
    fn test_seeded_fit_is_deterministic() {
        let x = clustered_with_outliers();
        let config = IsolationForestConfig::default();

        let mut a = IsolationForest::new(config.clone());
        let mut b = IsolationForest::new(config);
        a.fit(&x).unwrap();
        b.fit(&x).unwrap();

        let sa = a.score_samples(&x).unwrap();
        let sb = b.score_samples(&x).unwrap();
        for (x, y) in sa.iter().zip(sb.iter()) {
            assert_eq!(x, y);
        }
    }

    #[test]
    fn test_score_before_fit_fails() {
        let forest = IsolationForest::default();
        let x = Array2::zeros((3, 2));
        assert!(matches!(
            forest.score_samples(&x).unwrap_err(),
            LogSentinelError::NotFitted
        ));
    }

    #[test]
    fn test_fit_empty_fails() {
        let mut forest = IsolationForest::default();
        let x = Array2::zeros((0, 2));
        assert!(forest.fit(&x).is_err());
    }
}
