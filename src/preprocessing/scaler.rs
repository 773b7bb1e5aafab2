//! Feature scaling

use crate::error::{LogSentinelError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Type of scaler to use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalerType {
    /// Standard scaling (z-score): (x - mean) / std
    Standard,
    /// No scaling
    None,
}

/// Parameters for one fitted column
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScalerParams {
    center: f64,
    scale: f64,
}

/// Per-column feature scaler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
    scaler_type: ScalerType,
    params: HashMap<String, ScalerParams>,
    is_fitted: bool,
}

impl Scaler {
    pub fn new(scaler_type: ScalerType) -> Self {
        Self {
            scaler_type,
            params: HashMap::new(),
            is_fitted: false,
        }
    }

    /// Fit scaling parameters for the given columns
    pub fn fit(&mut self, df: &DataFrame, columns: &[&str]) -> Result<&mut Self> {
        for col_name in columns {
            let column = df.column(col_name).map_err(|_| {
                LogSentinelError::Transform(format!("scaler: column '{col_name}' not found"))
            })?;
            let ca = column.as_materialized_series().f64().map_err(|e| {
                LogSentinelError::Transform(format!("scaler: column '{col_name}' is not f64: {e}"))
            })?;

            let params = match self.scaler_type {
                ScalerType::Standard => {
                    let mean = ca.mean().unwrap_or(0.0);
                    let std = ca.std(1).unwrap_or(1.0);
                    ScalerParams {
                        center: mean,
                        scale: if std == 0.0 { 1.0 } else { std },
                    }
                }
                ScalerType::None => ScalerParams {
                    center: 0.0,
                    scale: 1.0,
                },
            };
            self.params.insert(col_name.to_string(), params);
        }

        self.is_fitted = true;
        Ok(self)
    }

    /// Apply the fitted scaling. Builds all replacement columns first,
    /// then applies them in one pass.
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(LogSentinelError::Transform(
                "scaler used before fit".to_string(),
            ));
        }

        let replacements: Vec<Series> = self
            .params
            .iter()
            .filter_map(|(col_name, params)| {
                df.column(col_name.as_str()).ok().map(|column| {
                    let ca = column.as_materialized_series().f64().map_err(|e| {
                        LogSentinelError::Transform(format!(
                            "scaler: column '{col_name}' is not f64: {e}"
                        ))
                    })?;
                    let scaled: Float64Chunked = ca
                        .into_iter()
                        .map(|opt| opt.map(|v| (v - params.center) / params.scale))
                        .collect();
                    Ok(scaled.with_name(col_name.as_str().into()).into_series())
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut result = df.clone();
        for scaled in replacements {
            result = result.with_column(scaled)?.clone();
        }

        Ok(result)
    }

    pub fn fit_transform(&mut self, df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
        self.fit(df, columns)?;
        self.transform(df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_scaler_zero_mean() {
        let df = df!("a" => &[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();

        let mut scaler = Scaler::new(ScalerType::Standard);
        let result = scaler.fit_transform(&df, &["a"]).unwrap();

        let col = result.column("a").unwrap().f64().unwrap();
        assert!(col.mean().unwrap().abs() < 1e-10);
        assert!((col.std(1).unwrap() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_constant_column_scale_guard() {
        let df = df!("a" => &[7.0, 7.0, 7.0]).unwrap();

        let mut scaler = Scaler::new(ScalerType::Standard);
        let result = scaler.fit_transform(&df, &["a"]).unwrap();

        let col = result.column("a").unwrap().f64().unwrap();
        // std 0 keeps scale at 1: values become 0, never NaN
        assert_eq!(col.get(0), Some(0.0));
    }

    #[test]
    fn test_none_scaler_passthrough() {
        let df = df!("a" => &[1.0, 2.0]).unwrap();
        let mut scaler = Scaler::new(ScalerType::None);
        let result = scaler.fit_transform(&df, &["a"]).unwrap();
        let col = result.column("a").unwrap().f64().unwrap();
        assert_eq!(col.get(1), Some(2.0));
    }

    #[test]
    fn test_transform_before_fit_fails() {
        let df = df!("a" => &[1.0]).unwrap();
        let scaler = Scaler::new(ScalerType::Standard);
        assert!(scaler.transform(&df).is_err());
    }
}
