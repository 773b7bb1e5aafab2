//! Ordinal encoding for categorical fields

use crate::error::{LogSentinelError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reserved code for category values never seen during fit
pub const UNKNOWN_CODE: f64 = -1.0;

/// Ordinal encoder: maps each category of each fitted column to a stable
/// integer code. Categories are sorted before assignment so the mapping is
/// deterministic for a given fit table. Values unseen during fit map to
/// [`UNKNOWN_CODE`] rather than failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdinalEncoder {
    // column name -> (category -> code)
    mappings: HashMap<String, HashMap<String, usize>>,
    is_fitted: bool,
}

impl OrdinalEncoder {
    pub fn new() -> Self {
        Self {
            mappings: HashMap::new(),
            is_fitted: false,
        }
    }

    /// Build category mappings for the given columns
    pub fn fit(&mut self, df: &DataFrame, columns: &[&str]) -> Result<&mut Self> {
        for col_name in columns {
            let column = df.column(col_name).map_err(|_| {
                LogSentinelError::Transform(format!("encoder: column '{col_name}' not found"))
            })?;
            let ca = column.as_materialized_series().str().map_err(|e| {
                LogSentinelError::Transform(format!(
                    "encoder: column '{col_name}' is not textual: {e}"
                ))
            })?;

            // BTreeSet gives the sorted, deduplicated category list
            let categories: Vec<String> = ca
                .into_iter()
                .flatten()
                .map(|s| s.to_string())
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect();

            let mapping: HashMap<String, usize> = categories
                .into_iter()
                .enumerate()
                .map(|(idx, cat)| (cat, idx))
                .collect();
            self.mappings.insert(col_name.to_string(), mapping);
        }

        self.is_fitted = true;
        Ok(self)
    }

    /// Replace each fitted column with its numeric codes
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(LogSentinelError::Transform(
                "encoder used before fit".to_string(),
            ));
        }

        let mut result = df.clone();
        for (col_name, mapping) in &self.mappings {
            if let Ok(column) = df.column(col_name.as_str()) {
                let ca = column.as_materialized_series().str().map_err(|e| {
                    LogSentinelError::Transform(format!(
                        "encoder: column '{col_name}' is not textual: {e}"
                    ))
                })?;

                let codes: Float64Chunked = ca
                    .into_iter()
                    .map(|opt| {
                        Some(match opt.and_then(|s| mapping.get(s)) {
                            Some(&idx) => idx as f64,
                            None => UNKNOWN_CODE,
                        })
                    })
                    .collect();

                result = result
                    .with_column(codes.with_name(col_name.as_str().into()).into_series())?
                    .clone();
            }
        }

        Ok(result)
    }

    pub fn fit_transform(&mut self, df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
        self.fit(df, columns)?;
        self.transform(df)
    }

    /// Number of categories seen for a column during fit
    pub fn cardinality(&self, column: &str) -> Option<usize> {
        self.mappings.get(column).map(|m| m.len())
    }
}

impl Default for OrdinalEncoder {
    fn default() -> Self {
        Self::new()
    }
}
