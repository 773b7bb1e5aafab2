//! Pipeline orchestrator: wires schema, preprocessor, and detector
//! together for the two supported flows.
//!
//! Fit flow: raw table -> schema -> preprocessor (fit) -> detector (fit),
//! yielding an owned artifact bundle. Score flow: raw table -> loaded
//! schema -> preprocessor (transform) -> detector (score/decide). Scoring
//! never mutates the bundle, so a fitted pipeline is safe for concurrent
//! read-only use; re-training builds a fresh bundle instead of mutating a
//! shared one.

use crate::detector::{Detector, DetectorConfig};
use crate::error::{LogSentinelError, Result};
use crate::eval::{self, EvaluationResult};
use crate::preprocessing::{Preprocessor, PreprocessorConfig};
use crate::schema::FeatureSchema;
use ndarray::Array1;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Ground-truth column expected on labeled tables (+1 normal, -1 anomaly)
pub const LABEL_COLUMN: &str = "label";
/// Score column attached to scored reports
pub const SCORE_COLUMN: &str = "anomaly_score";
/// Label column attached to scored reports
pub const PREDICTED_COLUMN: &str = "predicted_label";

const SCHEMA_FILE: &str = "schema.json";
const PREPROCESSOR_FILE: &str = "preprocessor.json";
const DETECTOR_FILE: &str = "detector.json";

/// Configuration for one training run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub preprocessor: PreprocessorConfig,
    pub detector: DetectorConfig,
}

/// Per-row output of the score flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredBatch {
    /// +1 = normal, -1 = anomalous
    pub labels: Array1<i32>,
    /// Lower = more anomalous
    pub scores: Array1<f64>,
}

impl ScoredBatch {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn n_anomalies(&self) -> usize {
        self.labels.iter().filter(|&&l| l == -1).count()
    }

    /// Append `anomaly_score` and `predicted_label` columns to the
    /// original records
    pub fn attach_to(&self, df: &DataFrame) -> Result<DataFrame> {
        if df.height() != self.len() {
            return Err(LogSentinelError::Shape {
                expected: format!("{} rows", self.len()),
                actual: format!("{}", df.height()),
            });
        }

        let scores: Vec<f64> = self.scores.iter().copied().collect();
        let labels: Vec<i32> = self.labels.iter().copied().collect();

        let mut result = df.clone();
        result = result
            .with_column(Series::new(SCORE_COLUMN.into(), scores))?
            .clone();
        result = result
            .with_column(Series::new(PREDICTED_COLUMN.into(), labels))?
            .clone();
        Ok(result)
    }

    /// The scored report filtered to rows labeled anomalous
    pub fn anomalies_only(&self, df: &DataFrame) -> Result<DataFrame> {
        let report = self.attach_to(df)?;
        let mask: BooleanChunked = self.labels.iter().map(|&l| Some(l == -1)).collect();
        Ok(report.filter(&mask)?)
    }
}

/// The owned artifact bundle: schema + fitted preprocessor + fitted
/// detector. There is no process-wide singleton; callers hold the value
/// and pass it where scoring happens.
#[derive(Debug, Clone)]
pub struct ScoringPipeline {
    schema: FeatureSchema,
    preprocessor: Preprocessor,
    detector: Detector,
}

impl ScoringPipeline {
    /// Fit the full pipeline from a raw training table. For the
    /// supervised detector variant the table must carry the ground-truth
    /// `label` column.
    pub fn fit(df: &DataFrame, config: PipelineConfig) -> Result<Self> {
        let features = strip_label(df)?;
        let schema = FeatureSchema::build(&features)?;

        let mut preprocessor = Preprocessor::with_config(schema.clone(), config.preprocessor);
        let matrix = preprocessor.fit_transform(&features)?;

        let mut detector = config.detector.build();
        if detector.is_supervised() {
            let y = extract_labels(df)?;
            detector.fit_supervised(&matrix, &y)?;
        } else {
            detector.fit(&matrix)?;
        }

        info!(
            detector = detector.name(),
            rows = df.height(),
            columns = schema.column_count(),
            "fitted pipeline"
        );

        Ok(Self {
            schema,
            preprocessor,
            detector,
        })
    }

    /// Score new raw records: per-row label and anomaly score
    pub fn score(&self, df: &DataFrame) -> Result<ScoredBatch> {
        let matrix = self.preprocessor.transform(df)?;
        let labels = self.detector.decide(&matrix)?;
        let scores = self.detector.score(&matrix)?;
        Ok(ScoredBatch { labels, scores })
    }

    /// Evaluate against a held-out labeled table
    pub fn evaluate(&mut self, df: &DataFrame) -> Result<EvaluationResult> {
        let y = extract_labels(df)?;
        let features = strip_label(df)?;
        let matrix = self.preprocessor.transform(&features)?;
        eval::evaluate(&mut self.detector, &matrix, &y)
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    /// Persist the artifact bundle into a directory
    pub fn save(&self, dir: &str) -> Result<()> {
        let dir = Path::new(dir);
        std::fs::create_dir_all(dir)
            .map_err(|e| LogSentinelError::Artifact(format!("cannot create {dir:?}: {e}")))?;

        self.schema.save(path_str(&dir.join(SCHEMA_FILE))?)?;
        self.preprocessor.save(path_str(&dir.join(PREPROCESSOR_FILE))?)?;
        self.detector.save(path_str(&dir.join(DETECTOR_FILE))?)?;
        info!(?dir, "saved pipeline artifacts");
        Ok(())
    }

    /// Load a previously saved bundle. Partial bundles and inconsistent
    /// artifacts are rejected outright: silently proceeding would produce
    /// wrong predictions.
    pub fn load(dir: &str) -> Result<Self> {
        let dir = Path::new(dir);

        let missing: Vec<&str> = [SCHEMA_FILE, PREPROCESSOR_FILE, DETECTOR_FILE]
            .into_iter()
            .filter(|f| !dir.join(f).exists())
            .collect();
        if !missing.is_empty() {
            return Err(LogSentinelError::Artifact(format!(
                "partial artifact bundle in {dir:?}: missing {missing:?}"
            )));
        }

        let schema = FeatureSchema::load(path_str(&dir.join(SCHEMA_FILE))?)?;
        let preprocessor = Preprocessor::load(path_str(&dir.join(PREPROCESSOR_FILE))?)?;
        let detector = Detector::load(path_str(&dir.join(DETECTOR_FILE))?)?;

        if !preprocessor.is_fitted() {
            return Err(LogSentinelError::Artifact(
                "preprocessor artifact was never fitted".to_string(),
            ));
        }
        if *preprocessor.schema() != schema {
            return Err(LogSentinelError::Artifact(format!(
                "schema artifact ({} columns) does not match the preprocessor's schema ({} columns)",
                schema.column_count(),
                preprocessor.schema().column_count()
            )));
        }

        Ok(Self {
            schema,
            preprocessor,
            detector,
        })
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| {
        LogSentinelError::Artifact(format!("artifact path {path:?} is not valid UTF-8"))
    })
}

/// Drop the ground-truth column if present so it never leaks into the
/// feature set
fn strip_label(df: &DataFrame) -> Result<DataFrame> {
    let has_label = df
        .get_column_names()
        .iter()
        .any(|n| n.as_str() == LABEL_COLUMN);
    if has_label {
        Ok(df.drop(LABEL_COLUMN)?)
    } else {
        Ok(df.clone())
    }
}

/// Pull the +1/-1 ground-truth vector from a labeled table
fn extract_labels(df: &DataFrame) -> Result<Array1<i32>> {
    let column = df.column(LABEL_COLUMN).map_err(|_| {
        LogSentinelError::Evaluation(format!(
            "table has no '{LABEL_COLUMN}' column with ground truth (+1 normal, -1 anomaly)"
        ))
    })?;
    let casted = column
        .as_materialized_series()
        .cast(&DataType::Int32)
        .map_err(|e| {
            LogSentinelError::Evaluation(format!("'{LABEL_COLUMN}' column is not integral: {e}"))
        })?;
    let ca = casted.i32()?;

    let mut labels = Vec::with_capacity(ca.len());
    for (i, opt) in ca.into_iter().enumerate() {
        match opt {
            Some(v) => labels.push(v),
            None => {
                return Err(LogSentinelError::Evaluation(format!(
                    "'{LABEL_COLUMN}' column has a null at row {i}"
                )))
            }
        }
    }
    Ok(Array1::from_vec(labels))
}
