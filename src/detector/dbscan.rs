//! DBSCAN density clustering used as an anomaly detector.
//!
//! Membership is determined only by the exact point set present at fit
//! time: there is no incremental scoring for this family. The adapter
//! exposes `fit_and_label` and rejects `score`/`decide` on new data.

use crate::error::{LogSentinelError, Result};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Hyperparameters for [`Dbscan`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbscanConfig {
    /// Maximum distance between neighbors
    pub eps: f64,
    /// Minimum points to form a dense region
    pub min_samples: usize,
}

impl Default for DbscanConfig {
    fn default() -> Self {
        Self {
            eps: 0.5,
            min_samples: 5,
        }
    }
}

/// DBSCAN: points are core, border, or noise. Noise (cluster id -1) is
/// what we report as anomalous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dbscan {
    config: DbscanConfig,
    /// Cluster ids assigned during the last fit (-1 = noise)
    cluster_labels: Option<Vec<i64>>,
    pub n_clusters_found: usize,
    pub n_noise: usize,
}

impl Dbscan {
    pub fn new(config: DbscanConfig) -> Self {
        Self {
            config,
            cluster_labels: None,
            n_clusters_found: 0,
            n_noise: 0,
        }
    }

    fn euclidean(a: &ndarray::ArrayView1<f64>, b: &ndarray::ArrayView1<f64>) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    fn region_query(x: &Array2<f64>, point_idx: usize, eps: f64) -> Vec<usize> {
        let row = x.row(point_idx);
        (0..x.nrows())
            .filter(|&i| Self::euclidean(&row, &x.row(i)) <= eps)
            .collect()
    }

    /// Cluster the given points and return per-row anomaly labels
    /// (+1 = member of some cluster, -1 = noise).
    pub fn fit_and_label(&mut self, x: &Array2<f64>) -> Result<Array1<i32>> {
        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(LogSentinelError::Data(
                "cannot cluster an empty matrix".to_string(),
            ));
        }
        let eps = self.config.eps;
        let min_samples = self.config.min_samples;

        let neighbors: Vec<Vec<usize>> = (0..n_samples)
            .into_par_iter()
            .map(|i| Self::region_query(x, i, eps))
            .collect();

        let is_core: Vec<bool> = neighbors.iter().map(|n| n.len() >= min_samples).collect();

        let mut labels = vec![-1i64; n_samples];
        let mut cluster_id: i64 = 0;

        for i in 0..n_samples {
            if labels[i] != -1 || !is_core[i] {
                continue;
            }

            labels[i] = cluster_id;
            let mut queue: Vec<usize> = neighbors[i].clone();
            let mut head = 0;

            while head < queue.len() {
                let q = queue[head];
                head += 1;

                if labels[q] == -1 {
                    labels[q] = cluster_id;
                }
                if !is_core[q] {
                    continue;
                }
                for &neighbor in &neighbors[q] {
                    if labels[neighbor] == -1 {
                        labels[neighbor] = cluster_id;
                        queue.push(neighbor);
                    }
                }
            }

            cluster_id += 1;
        }

        self.n_noise = labels.iter().filter(|&&l| l == -1).count();
        self.n_clusters_found = cluster_id as usize;
        info!(
            n_clusters = self.n_clusters_found,
            n_noise = self.n_noise,
            "clustered with DBSCAN"
        );

        let anomaly_labels: Vec<i32> = labels.iter().map(|&l| if l == -1 { -1 } else { 1 }).collect();
        self.cluster_labels = Some(labels);

        Ok(Array1::from_vec(anomaly_labels))
    }

    /// Cluster ids from the last fit (-1 = noise); used for cohesion
    /// metrics over the fitted sample set
    pub fn cluster_labels(&self) -> Option<&[i64]> {
        self.cluster_labels.as_deref()
    }
}

impl Default for Dbscan {
    fn default() -> Self {
        Self::new(DbscanConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_two_clusters_and_noise() {
        let x = array![
            [1.0, 1.0],
            [1.1, 1.1],
            [1.2, 1.0],
            [1.0, 1.2],
            [8.0, 8.0],
            [8.1, 8.1],
            [8.2, 8.0],
            [8.0, 8.2],
            [50.0, 50.0],
        ];
        let mut model = Dbscan::new(DbscanConfig {
            eps: 0.5,
            min_samples: 3,
        });
        let labels = model.fit_and_label(&x).unwrap();

        assert_eq!(model.n_clusters_found, 2);
        assert_eq!(model.n_noise, 1);
        assert_eq!(labels[0], 1);
        assert_eq!(labels[4], 1);
        assert_eq!(labels[8], -1);

        let clusters = model.cluster_labels().unwrap();
        assert_eq!(clusters[0], clusters[1]);
        assert_ne!(clusters[0], clusters[4]);
        assert_eq!(clusters[8], -1);
    }

    #[test]
    fn test_all_noise_when_sparse() {
        let x = array![[0.0, 0.0], [10.0, 10.0], [20.0, 20.0]];
        let mut model = Dbscan::new(DbscanConfig {
            eps: 0.5,
            min_samples: 2,
        });
        let labels = model.fit_and_label(&x).unwrap();
        assert!(labels.iter().all(|&l| l == -1));
        assert_eq!(model.n_clusters_found, 0);
    }

    #[test]
    fn test_empty_matrix_rejected() {
        let mut model = Dbscan::default();
        let x = Array2::zeros((0, 2));
        assert!(model.fit_and_label(&x).is_err());
    }
}
