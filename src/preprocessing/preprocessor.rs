//! The fitted, reusable preprocessing transform.
//!
//! `fit` is called exactly once per training run; `transform` applies the
//! fitted imputers/scaler/encoder identically at train and inference time
//! and never re-fits.

use crate::error::{LogSentinelError, Result};
use crate::schema::{self, FeatureSchema};
use super::encoder::OrdinalEncoder;
use super::imputer::{ImputeStrategy, Imputer};
use super::matrix::{CsrMatrix, FeatureMatrix};
use super::scaler::{Scaler, ScalerType};
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Sentinel inserted for missing categorical values
pub const MISSING_CATEGORY: &str = "missing";

/// Configuration for the preprocessor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessorConfig {
    /// Strategy for missing numeric values
    pub numeric_impute: ImputeStrategy,
    /// Scaler for numeric features
    pub scaler: ScalerType,
    /// Emit a CSR matrix instead of a dense one
    pub sparse_output: bool,
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            numeric_impute: ImputeStrategy::Median,
            scaler: ScalerType::Standard,
            sparse_output: false,
        }
    }
}

/// Fitted preprocessing transform: imputation + scaling for numeric
/// fields, imputation + ordinal encoding for categorical fields,
/// concatenated into one numeric matrix (numeric block first, then
/// categorical block, in schema order).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preprocessor {
    schema: FeatureSchema,
    config: PreprocessorConfig,
    numeric_imputer: Option<Imputer>,
    categorical_imputer: Option<Imputer>,
    scaler: Option<Scaler>,
    encoder: Option<OrdinalEncoder>,
    is_fitted: bool,
}

impl Preprocessor {
    pub fn new(schema: FeatureSchema) -> Self {
        Self::with_config(schema, PreprocessorConfig::default())
    }

    pub fn with_config(schema: FeatureSchema, config: PreprocessorConfig) -> Self {
        Self {
            schema,
            config,
            numeric_imputer: None,
            categorical_imputer: None,
            scaler: None,
            encoder: None,
            is_fitted: false,
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Number of columns every emitted matrix has
    pub fn column_count(&self) -> usize {
        self.schema.column_count()
    }

    /// Fit imputers, scaler, and encoder against the training table
    pub fn fit(&mut self, df: &DataFrame) -> Result<&mut Self> {
        let mut conformed = self.conform(df)?;

        if !self.schema.numeric.is_empty() {
            let cols: Vec<&str> = self.schema.numeric.iter().map(|s| s.as_str()).collect();

            let mut imputer = Imputer::new(self.config.numeric_impute.clone());
            conformed = imputer.fit_transform(&conformed, &cols)?;
            self.numeric_imputer = Some(imputer);

            let mut scaler = Scaler::new(self.config.scaler.clone());
            scaler.fit(&conformed, &cols)?;
            self.scaler = Some(scaler);
        }

        if !self.schema.categorical.is_empty() {
            let cols: Vec<&str> = self.schema.categorical.iter().map(|s| s.as_str()).collect();

            let mut imputer =
                Imputer::new(ImputeStrategy::ConstantString(MISSING_CATEGORY.to_string()));
            conformed = imputer.fit_transform(&conformed, &cols)?;
            self.categorical_imputer = Some(imputer);

            let mut encoder = OrdinalEncoder::new();
            encoder.fit(&conformed, &cols)?;
            self.encoder = Some(encoder);
        }

        self.is_fitted = true;
        info!(
            rows = df.height(),
            columns = self.column_count(),
            "fitted preprocessor"
        );
        Ok(self)
    }

    /// Apply the fitted transform. Always emits a matrix with the same
    /// column count and order regardless of which optional fields are
    /// present in the input.
    pub fn transform(&self, df: &DataFrame) -> Result<FeatureMatrix> {
        if !self.is_fitted {
            return Err(LogSentinelError::Transform(
                "transform called before fit (or before a fitted artifact was loaded)".to_string(),
            ));
        }

        let mut conformed = self.conform(df)?;

        if let Some(ref imputer) = self.numeric_imputer {
            conformed = imputer.transform(&conformed)?;
        }
        if let Some(ref scaler) = self.scaler {
            conformed = scaler.transform(&conformed)?;
        }
        if let Some(ref imputer) = self.categorical_imputer {
            conformed = imputer.transform(&conformed)?;
        }
        if let Some(ref encoder) = self.encoder {
            conformed = encoder.transform(&conformed)?;
        }

        self.assemble(&conformed)
    }

    pub fn fit_transform(&mut self, df: &DataFrame) -> Result<FeatureMatrix> {
        self.fit(df)?;
        self.transform(df)
    }

    /// Save the fitted preprocessor to a JSON file
    pub fn save(&self, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| {
            LogSentinelError::Artifact(format!("cannot write preprocessor {path}: {e}"))
        })?;
        Ok(())
    }

    /// Load a fitted preprocessor from a JSON file
    pub fn load(path: &str) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            LogSentinelError::Artifact(format!("cannot read preprocessor {path}: {e}"))
        })?;
        let preprocessor: Self = serde_json::from_str(&json)
            .map_err(|e| LogSentinelError::Artifact(format!("corrupt preprocessor {path}: {e}")))?;
        Ok(preprocessor)
    }

    /// Reindex the input to exactly the schema's field set (synthesizing
    /// defaults for absent fields), coerce numeric fields to f64 with
    /// unparseable values as nulls, and coerce categorical fields to text.
    fn conform(&self, df: &DataFrame) -> Result<DataFrame> {
        let df = if self.schema.has_time_features() {
            schema::derive_time_features(df)?
        } else {
            df.clone()
        };
        let height = df.height();

        let mut columns: Vec<Column> = Vec::with_capacity(self.schema.column_count());

        for field in &self.schema.numeric {
            let col = match df.column(field.as_str()) {
                Ok(col) => {
                    let series = col.as_materialized_series();
                    Self::reject_nested(field, series.dtype())?;
                    let casted = series.cast(&DataType::Float64).map_err(|e| {
                        LogSentinelError::Transform(format!(
                            "field '{field}' cannot be coerced to numeric: {e}"
                        ))
                    })?;
                    casted.with_name(field.as_str().into()).into_column()
                }
                // Absent numeric fields become all-null and are filled by
                // the fitted imputer (median, or 0 when fit never saw them).
                Err(_) => {
                    Series::full_null(field.as_str().into(), height, &DataType::Float64)
                        .into_column()
                }
            };
            columns.push(col);
        }

        for field in &self.schema.categorical {
            let col = match df.column(field.as_str()) {
                Ok(col) => {
                    let series = col.as_materialized_series();
                    Self::reject_nested(field, series.dtype())?;
                    let casted = series.cast(&DataType::String).map_err(|e| {
                        LogSentinelError::Transform(format!(
                            "field '{field}' cannot be coerced to text: {e}"
                        ))
                    })?;
                    casted.with_name(field.as_str().into()).into_column()
                }
                Err(_) => {
                    let values: StringChunked =
                        std::iter::repeat(Some(MISSING_CATEGORY)).take(height).collect();
                    values.with_name(field.as_str().into()).into_column()
                }
            };
            columns.push(col);
        }

        DataFrame::new(columns).map_err(|e| {
            LogSentinelError::Transform(format!("cannot reconcile input with schema: {e}"))
        })
    }

    fn reject_nested(field: &str, dtype: &DataType) -> Result<()> {
        if matches!(dtype, DataType::List(_)) {
            return Err(LogSentinelError::Transform(format!(
                "field '{field}' holds list values where a scalar is required"
            )));
        }
        Ok(())
    }

    /// Materialize the conformed, transformed table as a feature matrix
    fn assemble(&self, df: &DataFrame) -> Result<FeatureMatrix> {
        let nrows = df.height();
        let ncols = self.column_count();

        let mut column_data: Vec<Vec<f64>> = Vec::with_capacity(ncols);
        for field in self.schema.numeric.iter().chain(self.schema.categorical.iter()) {
            let ca = df.column(field.as_str())?.as_materialized_series().f64().map_err(|e| {
                LogSentinelError::Transform(format!(
                    "field '{field}' is not numeric after transformation: {e}"
                ))
            })?;
            column_data.push(ca.into_iter().map(|v| v.unwrap_or(0.0)).collect());
        }

        let dense = Array2::from_shape_fn((nrows, ncols), |(i, j)| column_data[j][i]);

        if self.config.sparse_output {
            Ok(FeatureMatrix::Sparse(CsrMatrix::from_dense(&dense)))
        } else {
            Ok(FeatureMatrix::Dense(dense))
        }
    }
}
