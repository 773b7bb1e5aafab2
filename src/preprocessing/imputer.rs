//! Missing value imputation

use crate::error::{LogSentinelError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Strategy for imputing missing values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImputeStrategy {
    /// Replace with the column median (numeric only)
    Median,
    /// Replace with the column mean (numeric only)
    Mean,
    /// Replace with a constant value
    Constant(f64),
    /// Replace with a constant string (categorical)
    ConstantString(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum FillValue {
    Numeric(f64),
    Text(String),
}

/// Imputer for handling missing values.
///
/// Fill values are computed once during `fit` and applied verbatim by
/// every subsequent `transform`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Imputer {
    strategy: ImputeStrategy,
    fill_values: HashMap<String, FillValue>,
    is_fitted: bool,
}

impl Imputer {
    pub fn new(strategy: ImputeStrategy) -> Self {
        Self {
            strategy,
            fill_values: HashMap::new(),
            is_fitted: false,
        }
    }

    /// Compute fill values for the given columns
    pub fn fit(&mut self, df: &DataFrame, columns: &[&str]) -> Result<&mut Self> {
        for col_name in columns {
            let column = df.column(col_name).map_err(|_| {
                LogSentinelError::Transform(format!("imputer: column '{col_name}' not found"))
            })?;
            let series = column.as_materialized_series();

            let fill = match &self.strategy {
                ImputeStrategy::Median => {
                    let median = series.cast(&DataType::Float64)?.f64()?.median().unwrap_or(0.0);
                    FillValue::Numeric(median)
                }
                ImputeStrategy::Mean => {
                    let mean = series.cast(&DataType::Float64)?.f64()?.mean().unwrap_or(0.0);
                    FillValue::Numeric(mean)
                }
                ImputeStrategy::Constant(v) => FillValue::Numeric(*v),
                ImputeStrategy::ConstantString(s) => FillValue::Text(s.clone()),
            };
            self.fill_values.insert(col_name.to_string(), fill);
        }

        self.is_fitted = true;
        Ok(self)
    }

    /// Fill nulls in the fitted columns; other columns pass through
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(LogSentinelError::Transform(
                "imputer used before fit".to_string(),
            ));
        }

        let mut result = df.clone();
        for (col_name, fill) in &self.fill_values {
            if let Ok(col) = df.column(col_name.as_str()) {
                let filled = Self::fill_series(col.as_materialized_series(), fill)?;
                result = result.with_column(filled)?.clone();
            }
        }

        Ok(result)
    }

    pub fn fit_transform(&mut self, df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
        self.fit(df, columns)?;
        self.transform(df)
    }

    fn fill_series(series: &Series, fill: &FillValue) -> Result<Series> {
        match fill {
            FillValue::Numeric(val) => {
                let ca = series.f64().map_err(|e| {
                    LogSentinelError::Transform(format!(
                        "imputer: column '{}' is not numeric: {e}",
                        series.name()
                    ))
                })?;
                let filled: Float64Chunked =
                    ca.into_iter().map(|opt| Some(opt.unwrap_or(*val))).collect();
                Ok(filled.with_name(series.name().clone()).into_series())
            }
            FillValue::Text(val) => {
                let ca = series.str().map_err(|e| {
                    LogSentinelError::Transform(format!(
                        "imputer: column '{}' is not textual: {e}",
                        series.name()
                    ))
                })?;
                let filled: StringChunked = ca
                    .into_iter()
                    .map(|opt| Some(opt.unwrap_or(val.as_str())))
                    .collect();
                Ok(filled.with_name(series.name().clone()).into_series())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_imputation() {
        let df = DataFrame::new(vec![Column::new(
            "score".into(),
            &[Some(1.0), None, Some(3.0), Some(10.0)],
        )])
        .unwrap();

        let mut imputer = Imputer::new(ImputeStrategy::Median);
        let result = imputer.fit_transform(&df, &["score"]).unwrap();

        let col = result.column("score").unwrap().f64().unwrap();
        assert_eq!(col.get(1), Some(3.0)); // median of [1, 3, 10]
    }

    #[test]
    fn test_constant_string_imputation() {
        let df = DataFrame::new(vec![Column::new(
            "user".into(),
            &[Some("root"), None, Some("admin")],
        )])
        .unwrap();

        let mut imputer = Imputer::new(ImputeStrategy::ConstantString("missing".to_string()));
        let result = imputer.fit_transform(&df, &["user"]).unwrap();

        let col = result.column("user").unwrap().str().unwrap();
        assert_eq!(col.get(1), Some("missing"));
    }

    #[test]
    fn test_transform_before_fit_fails() {
        let df = df!("a" => &[1.0, 2.0]).unwrap();
        let imputer = Imputer::new(ImputeStrategy::Median);
        assert!(matches!(
            imputer.transform(&df).unwrap_err(),
            LogSentinelError::Transform(_)
        ));
    }

    #[test]
    fn test_all_null_column_falls_back_to_zero() {
        let df = DataFrame::new(vec![Column::new(
            "empty".into(),
            &[None::<f64>, None, None],
        )])
        .unwrap();

        let mut imputer = Imputer::new(ImputeStrategy::Median);
        let result = imputer.fit_transform(&df, &["empty"]).unwrap();
        let col = result.column("empty").unwrap().f64().unwrap();
        assert_eq!(col.get(0), Some(0.0));
    }
}
