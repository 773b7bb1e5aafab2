//! One-class SVM (boundary-based anomaly detection).
//!
//! Learns the support of the training distribution with an RBF kernel;
//! the decision value is the signed distance to the learned boundary,
//! negative = outside the normal envelope.

use crate::error::{LogSentinelError, Result};
use super::AnomalyDetector;
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Maximum number of samples for eager kernel matrix computation.
/// Beyond this, training returns an error to prevent OOM.
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// RBF kernel bandwidth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Gamma {
    /// 1 / n_features
    Auto,
    Value(f64),
}

/// Hyperparameters for [`OneClassSvm`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneClassSvmConfig {
    /// Upper bound on the fraction of training errors, lower bound on the
    /// fraction of support vectors
    pub nu: f64,
    /// Kernel bandwidth
    pub gamma: Gamma,
    /// Stopping tolerance on the maximal KKT violation
    pub tol: f64,
    /// Maximum number of pairwise optimization steps
    pub max_iter: usize,
}

impl Default for OneClassSvmConfig {
    fn default() -> Self {
        Self {
            nu: 0.05,
            gamma: Gamma::Auto,
            tol: 1e-4,
            max_iter: 10_000,
        }
    }
}

/// One-class SVM trained by pairwise coordinate descent on the nu-SVM
/// dual (all samples share the +1 label, so working-set selection reduces
/// to the most violating gradient pair).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneClassSvm {
    config: OneClassSvmConfig,
    support_vectors: Option<Array2<f64>>,
    alphas: Option<Array1<f64>>,
    rho: f64,
    gamma_value: f64,
}

impl OneClassSvm {
    pub fn new(config: OneClassSvmConfig) -> Self {
        Self {
            config,
            support_vectors: None,
            alphas: None,
            rho: 0.0,
            gamma_value: 0.0,
        }
    }

    fn rbf(a: &[f64], b: &[f64], gamma: f64) -> f64 {
        let sq_dist: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
        (-gamma * sq_dist).exp()
    }

    fn kernel_matrix(x: &Array2<f64>, gamma: f64) -> Vec<Vec<f64>> {
        let rows: Vec<Vec<f64>> = x.rows().into_iter().map(|r| r.to_vec()).collect();
        (0..rows.len())
            .into_par_iter()
            .map(|i| {
                (0..rows.len())
                    .map(|j| Self::rbf(&rows[i], &rows[j], gamma))
                    .collect()
            })
            .collect()
    }

    /// Signed decision values; negative = outside the envelope
    fn decision(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let sv = self
            .support_vectors
            .as_ref()
            .ok_or(LogSentinelError::NotFitted)?;
        let alphas = self.alphas.as_ref().ok_or(LogSentinelError::NotFitted)?;
        let gamma = self.gamma_value;
        let rho = self.rho;

        let sv_rows: Vec<Vec<f64>> = sv.rows().into_iter().map(|r| r.to_vec()).collect();
        let values: Vec<f64> = x
            .rows()
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|row| {
                let sample: Vec<f64> = row.iter().copied().collect();
                let sum: f64 = sv_rows
                    .iter()
                    .zip(alphas.iter())
                    .map(|(v, &a)| a * Self::rbf(v, &sample, gamma))
                    .sum();
                sum - rho
            })
            .collect();

        Ok(Array1::from_vec(values))
    }
}

impl Default for OneClassSvm {
    fn default() -> Self {
        Self::new(OneClassSvmConfig::default())
    }
}

impl AnomalyDetector for OneClassSvm {
    fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        let n = x.nrows();
        if n == 0 {
            return Err(LogSentinelError::Data(
                "cannot fit one-class SVM on an empty matrix".to_string(),
            ));
        }
        if n > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(LogSentinelError::InvalidParameter {
                name: "n_samples".to_string(),
                value: n.to_string(),
                reason: format!("kernel matrix limited to {MAX_KERNEL_MATRIX_SAMPLES} samples"),
            });
        }
        let nu = self.config.nu;
        if !(0.0 < nu && nu <= 1.0) {
            return Err(LogSentinelError::InvalidParameter {
                name: "nu".to_string(),
                value: nu.to_string(),
                reason: "must be in (0, 1]".to_string(),
            });
        }

        let gamma = match self.config.gamma {
            Gamma::Auto => 1.0 / x.ncols().max(1) as f64,
            Gamma::Value(v) => v,
        };
        let kernel = Self::kernel_matrix(x, gamma);

        // Dual box constraint: 0 <= alpha_i <= c, sum alpha = 1
        let c = 1.0 / (nu * n as f64);
        let mut alphas = vec![0.0f64; n];
        let n_bound = ((nu * n as f64).floor() as usize).min(n);
        for a in alphas.iter_mut().take(n_bound) {
            *a = c;
        }
        if n_bound < n {
            alphas[n_bound] = 1.0 - n_bound as f64 * c;
        }

        // Gradient of the dual objective: g_i = sum_j alpha_j K(i, j)
        let mut grad: Vec<f64> = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| alphas[j] * kernel[i][j])
                    .sum()
            })
            .collect();

        let mut iterations = 0usize;
        loop {
            // Most violating pair: i can give weight away, j can take more
            let mut up: Option<(usize, f64)> = None;
            let mut down: Option<(usize, f64)> = None;
            for k in 0..n {
                if alphas[k] > 1e-12 && up.map_or(true, |(_, g)| grad[k] > g) {
                    up = Some((k, grad[k]));
                }
                if alphas[k] < c - 1e-12 && down.map_or(true, |(_, g)| grad[k] < g) {
                    down = Some((k, grad[k]));
                }
            }
            let ((i, g_i), (j, g_j)) = match (up, down) {
                (Some(a), Some(b)) => (a, b),
                _ => break,
            };
            if i == j || g_i - g_j < self.config.tol || iterations >= self.config.max_iter {
                break;
            }

            let eta = kernel[i][i] + kernel[j][j] - 2.0 * kernel[i][j];
            let mut delta = if eta > 1e-12 {
                (g_i - g_j) / eta
            } else {
                f64::INFINITY
            };
            delta = delta.min(alphas[i]).min(c - alphas[j]);

            alphas[i] -= delta;
            alphas[j] += delta;
            for (k, g) in grad.iter_mut().enumerate() {
                *g += delta * (kernel[j][k] - kernel[i][k]);
            }
            iterations += 1;
        }

        // rho from free support vectors (strictly inside the box); bound
        // SVs only bracket it
        let free: Vec<f64> = (0..n)
            .filter(|&k| alphas[k] > 1e-8 && alphas[k] < c - 1e-8)
            .map(|k| grad[k])
            .collect();
        let rho = if !free.is_empty() {
            free.iter().sum::<f64>() / free.len() as f64
        } else {
            let on: Vec<f64> = (0..n).filter(|&k| alphas[k] > 1e-8).map(|k| grad[k]).collect();
            on.iter().sum::<f64>() / on.len().max(1) as f64
        };

        // Keep only the support vectors
        let sv_indices: Vec<usize> = (0..n).filter(|&k| alphas[k] > 1e-8).collect();
        let mut sv = Array2::zeros((sv_indices.len(), x.ncols()));
        let mut sv_alphas = Array1::zeros(sv_indices.len());
        for (row, &idx) in sv_indices.iter().enumerate() {
            sv.row_mut(row).assign(&x.row(idx));
            sv_alphas[row] = alphas[idx];
        }

        info!(
            n_support = sv_indices.len(),
            iterations, "fitted one-class SVM"
        );

        self.support_vectors = Some(sv);
        self.alphas = Some(sv_alphas);
        self.rho = rho;
        self.gamma_value = gamma;
        Ok(())
    }

    fn score_samples(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.decision(x)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i32>> {
        let scores = self.decision(x)?;
        Ok(scores.mapv(|s| if s < 0.0 { -1 } else { 1 }))
    }
}
