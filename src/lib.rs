//! logsentinel - Anomaly scoring for structured security-event logs
//!
//! This crate converts heterogeneous, partially-missing log records into a
//! fixed-width numeric feature matrix and scores each record with
//! interchangeable anomaly detectors:
//!
//! - [`schema`] - Declarative feature schema built from a training table
//! - [`preprocessing`] - Fitted imputation, scaling, and encoding
//! - [`detector`] - Isolation forest, one-class SVM, DBSCAN, and a
//!   supervised risk classifier behind one contract
//! - [`eval`] - Precision-recall threshold tuning and the metrics bundle
//! - [`pipeline`] - The fit/score orchestrator and artifact bundle
//! - [`synthetic`] - Seeded labeled test-set generation
//! - [`utils`] - Data loading helpers

pub mod error;

pub mod schema;
pub mod preprocessing;
pub mod detector;
pub mod eval;
pub mod pipeline;
pub mod synthetic;
pub mod utils;

pub use error::{LogSentinelError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{LogSentinelError, Result};

    pub use crate::schema::FeatureSchema;

    pub use crate::preprocessing::{
        FeatureMatrix, ImputeStrategy, Preprocessor, PreprocessorConfig, ScalerType,
    };

    pub use crate::detector::{
        AnomalyDetector, DbscanConfig, Detector, DetectorConfig, IsolationForestConfig,
        OneClassSvmConfig, RiskClassifierConfig,
    };

    pub use crate::eval::{evaluate, ConfusionMatrix, EvaluationResult};

    pub use crate::pipeline::{PipelineConfig, ScoredBatch, ScoringPipeline};

    pub use crate::synthetic::{generate_labeled_testset, SyntheticConfig};

    pub use crate::utils::DataLoader;
}
