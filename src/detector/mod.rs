//! Detector adapter: a uniform wrapper over the unsupervised anomaly
//! detector families and the supervised risk classifier.
//!
//! Conventions normalized at this boundary:
//! - continuous scores: lower = more anomalous, negative = outside the
//!   normal envelope
//! - labels: +1 = normal, -1 = anomalous
//!
//! Capability differences between families are explicit: callers branch on
//! [`Detector::supports_continuous_score`] and
//! [`Detector::supports_incremental_decide`] instead of on algorithm
//! identity, and unsupported operations fail fast.

mod dbscan;
mod isolation_forest;
mod one_class_svm;
mod risk_classifier;

pub use dbscan::{Dbscan, DbscanConfig};
pub use isolation_forest::{IsolationForest, IsolationForestConfig};
pub use one_class_svm::{Gamma, OneClassSvm, OneClassSvmConfig};
pub use risk_classifier::{RiskClassifier, RiskClassifierConfig};

use crate::error::{LogSentinelError, Result};
use crate::preprocessing::FeatureMatrix;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Shared contract for detectors that can score data not seen during fit
pub trait AnomalyDetector: Send + Sync {
    /// Fit the detector on training data
    fn fit(&mut self, x: &Array2<f64>) -> Result<()>;

    /// Continuous anomaly scores; lower = more anomalous
    fn score_samples(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Hard labels: +1 = normal, -1 = anomalous
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i32>>;
}

/// Which detector variant to build, with its hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DetectorConfig {
    IsolationForest(IsolationForestConfig),
    OneClassSvm(OneClassSvmConfig),
    Dbscan(DbscanConfig),
    RiskClassifier(RiskClassifierConfig),
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig::IsolationForest(IsolationForestConfig::default())
    }
}

impl DetectorConfig {
    pub fn build(&self) -> Detector {
        match self {
            DetectorConfig::IsolationForest(c) => {
                Detector::IsolationForest(IsolationForest::new(c.clone()))
            }
            DetectorConfig::OneClassSvm(c) => Detector::OneClassSvm(OneClassSvm::new(c.clone())),
            DetectorConfig::Dbscan(c) => Detector::Dbscan(Dbscan::new(c.clone())),
            DetectorConfig::RiskClassifier(c) => {
                Detector::RiskClassifier(RiskClassifier::new(c.clone()))
            }
        }
    }
}

/// A fitted (or fittable) detector of any supported family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Detector {
    IsolationForest(IsolationForest),
    OneClassSvm(OneClassSvm),
    Dbscan(Dbscan),
    RiskClassifier(RiskClassifier),
}

impl Detector {
    pub fn name(&self) -> &'static str {
        match self {
            Detector::IsolationForest(_) => "isolation_forest",
            Detector::OneClassSvm(_) => "one_class_svm",
            Detector::Dbscan(_) => "dbscan",
            Detector::RiskClassifier(_) => "risk_classifier",
        }
    }

    /// Whether `score` yields a real-valued score (vs cluster membership)
    pub fn supports_continuous_score(&self) -> bool {
        !matches!(self, Detector::Dbscan(_))
    }

    /// Whether `decide` works on data not seen during fit
    pub fn supports_incremental_decide(&self) -> bool {
        !matches!(self, Detector::Dbscan(_))
    }

    /// Whether fitting requires ground-truth labels
    pub fn is_supervised(&self) -> bool {
        matches!(self, Detector::RiskClassifier(_))
    }

    /// Fit on unlabeled training data
    pub fn fit(&mut self, x: &FeatureMatrix) -> Result<()> {
        let dense = x.dense();
        match self {
            Detector::IsolationForest(d) => d.fit(dense.as_ref()),
            Detector::OneClassSvm(d) => d.fit(dense.as_ref()),
            Detector::Dbscan(d) => d.fit_and_label(dense.as_ref()).map(|_| ()),
            Detector::RiskClassifier(_) => Err(LogSentinelError::unsupported(
                self.name(),
                "fit",
                "supervised classifier requires labels; use fit_supervised",
            )),
        }
    }

    /// Fit against ground-truth labels (+1/-1); supervised variant only
    pub fn fit_supervised(&mut self, x: &FeatureMatrix, y: &Array1<i32>) -> Result<()> {
        match self {
            Detector::RiskClassifier(d) => d.fit_supervised(x.dense().as_ref(), y),
            _ => Err(LogSentinelError::unsupported(
                self.name(),
                "fit_supervised",
                "unsupervised detector takes no labels; use fit",
            )),
        }
    }

    /// Continuous anomaly score per row; lower = more anomalous
    pub fn score(&self, x: &FeatureMatrix) -> Result<Array1<f64>> {
        let dense = x.dense();
        match self {
            Detector::IsolationForest(d) => d.score_samples(dense.as_ref()),
            Detector::OneClassSvm(d) => d.score_samples(dense.as_ref()),
            Detector::RiskClassifier(d) => d.score_samples(dense.as_ref()),
            Detector::Dbscan(_) => Err(LogSentinelError::unsupported(
                self.name(),
                "score",
                "cluster membership is defined only for the fitted sample set; use fit_and_label",
            )),
        }
    }

    /// Hard label per row: +1 normal, -1 anomalous
    pub fn decide(&self, x: &FeatureMatrix) -> Result<Array1<i32>> {
        let dense = x.dense();
        match self {
            Detector::IsolationForest(d) => d.predict(dense.as_ref()),
            Detector::OneClassSvm(d) => d.predict(dense.as_ref()),
            Detector::RiskClassifier(d) => d.predict(dense.as_ref()),
            Detector::Dbscan(_) => Err(LogSentinelError::unsupported(
                self.name(),
                "decide",
                "cluster membership is defined only for the fitted sample set; use fit_and_label",
            )),
        }
    }

    /// Fit on the given points and label exactly those points. For the
    /// clustering family this is the only labeling operation; for the
    /// scoring families it is fit followed by decide.
    pub fn fit_and_label(&mut self, x: &FeatureMatrix) -> Result<Array1<i32>> {
        match self {
            Detector::Dbscan(d) => d.fit_and_label(x.dense().as_ref()),
            Detector::RiskClassifier(_) => Err(LogSentinelError::unsupported(
                self.name(),
                "fit_and_label",
                "supervised classifier requires labels; use fit_supervised",
            )),
            _ => {
                self.fit(x)?;
                self.decide(x)
            }
        }
    }

    /// Cluster ids from the last fit (clustering family only)
    pub fn cluster_labels(&self) -> Option<&[i64]> {
        match self {
            Detector::Dbscan(d) => d.cluster_labels(),
            _ => None,
        }
    }

    /// Save the detector to a JSON file
    pub fn save(&self, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|e| LogSentinelError::Artifact(format!("cannot write detector {path}: {e}")))?;
        Ok(())
    }

    /// Load a detector from a JSON file
    pub fn load(path: &str) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| LogSentinelError::Artifact(format!("cannot read detector {path}: {e}")))?;
        let detector: Self = serde_json::from_str(&json)
            .map_err(|e| LogSentinelError::Artifact(format!("corrupt detector {path}: {e}")))?;
        Ok(detector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn cluster_matrix() -> FeatureMatrix {
        let mut data = Vec::new();
        for i in 0..30 {
            data.push((i % 5) as f64 * 0.1);
            data.push((i % 3) as f64 * 0.1);
        }
        FeatureMatrix::Dense(Array2::from_shape_vec((30, 2), data).unwrap())
    }

    #[test]
    fn test_capability_flags() {
        let iso = DetectorConfig::default().build();
        assert!(iso.supports_continuous_score());
        assert!(iso.supports_incremental_decide());

        let db = DetectorConfig::Dbscan(DbscanConfig::default()).build();
        assert!(!db.supports_continuous_score());
        assert!(!db.supports_incremental_decide());

        let clf = DetectorConfig::RiskClassifier(RiskClassifierConfig::default()).build();
        assert!(clf.is_supervised());
    }

    #[test]
    fn test_dbscan_score_fails_fast() {
        let x = cluster_matrix();
        let mut db = DetectorConfig::Dbscan(DbscanConfig::default()).build();
        db.fit_and_label(&x).unwrap();

        let err = db.score(&x).unwrap_err();
        assert!(matches!(
            err,
            LogSentinelError::UnsupportedOperation { .. }
        ));
        let err = db.decide(&x).unwrap_err();
        assert!(matches!(
            err,
            LogSentinelError::UnsupportedOperation { .. }
        ));
    }

    #[test]
    fn test_supervised_rejects_unsupervised_fit() {
        let x = cluster_matrix();
        let mut clf = DetectorConfig::RiskClassifier(RiskClassifierConfig::default()).build();
        assert!(matches!(
            clf.fit(&x).unwrap_err(),
            LogSentinelError::UnsupportedOperation { .. }
        ));
    }

    #[test]
    fn test_fit_and_label_on_scoring_family() {
        let x = cluster_matrix();
        let mut iso = DetectorConfig::default().build();
        let labels = iso.fit_and_label(&x).unwrap();
        assert_eq!(labels.len(), 30);
        assert!(labels.iter().all(|&l| l == 1 || l == -1));
    }

    #[test]
    fn test_detector_round_trip() {
        let x = cluster_matrix();
        let mut iso = DetectorConfig::default().build();
        iso.fit(&x).unwrap();
        let before = iso.score(&x).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detector.json");
        let path = path.to_str().unwrap();
        iso.save(path).unwrap();

        let loaded = Detector::load(path).unwrap();
        let after = loaded.score(&x).unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
