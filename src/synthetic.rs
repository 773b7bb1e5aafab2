//! Synthetic labeled test sets for evaluating detectors when real ground
//! truth is scarce.
//!
//! Samples rows from a base table, backfills the derived time features,
//! and injects a fraction of pseudo ground-truth anomalies (label -1,
//! isolation-forest convention). Injected rows can optionally have their
//! numeric fields shifted so they are separable outliers rather than
//! relabeled inliers.

use crate::error::{LogSentinelError, Result};
use crate::pipeline::LABEL_COLUMN;
use crate::schema::{self, DAY_OF_WEEK_FIELD, HOUR_FIELD, TIMESTAMP_FIELD};
use crate::utils::sample_rows;
use polars::prelude::*;
use rand::prelude::*;
use tracing::info;

const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Configuration for synthetic test-set generation
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Number of rows to sample from the base table
    pub sample_size: usize,
    /// Fraction of rows tagged as anomalies (at least one is always
    /// injected)
    pub anomaly_fraction: f64,
    /// Additive shift applied to the numeric fields of injected rows;
    /// 0.0 leaves them untouched
    pub outlier_shift: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            sample_size: 100,
            anomaly_fraction: 0.05,
            outlier_shift: 1000.0,
            seed: 42,
        }
    }
}

/// Build a labeled test table from a base table of raw records
pub fn generate_labeled_testset(df: &DataFrame, config: &SyntheticConfig) -> Result<DataFrame> {
    if df.height() == 0 {
        return Err(LogSentinelError::Data(
            "cannot generate a test set from an empty table".to_string(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut result = sample_rows(df, config.sample_size, config.seed)?;
    let n = result.height();

    result = ensure_time_features(&result, &mut rng)?;

    // Inject pseudo ground truth: +1 normal, -1 anomaly
    let n_anomalies = ((config.anomaly_fraction * n as f64) as usize).max(1).min(n);
    let anomaly_rows: Vec<usize> = rand::seq::index::sample(&mut rng, n, n_anomalies).into_vec();

    let mut labels = vec![1i32; n];
    for &row in &anomaly_rows {
        labels[row] = -1;
    }
    result = result
        .with_column(Series::new(LABEL_COLUMN.into(), labels))?
        .clone();

    if config.outlier_shift != 0.0 {
        result = shift_numeric_fields(&result, &anomaly_rows, config.outlier_shift)?;
    }

    info!(
        rows = n,
        n_anomalies, "generated synthetic labeled test set"
    );
    Ok(result)
}

/// Make sure `hour` and `day_of_week` exist: derived from the timestamp
/// when one is present, random otherwise
fn ensure_time_features(df: &DataFrame, rng: &mut StdRng) -> Result<DataFrame> {
    let columns: Vec<&str> = df.get_column_names().iter().map(|n| n.as_str()).collect();
    let n = df.height();

    if columns.contains(&TIMESTAMP_FIELD) {
        let derived = schema::derive_time_features(df)?;

        // Unparseable stamps leave nulls; give them fixed defaults so the
        // test set is fully populated
        let hours: Float64Chunked = derived
            .column(HOUR_FIELD)?
            .as_materialized_series()
            .f64()?
            .into_iter()
            .map(|opt| Some(opt.unwrap_or(0.0)))
            .collect();
        let days: StringChunked = derived
            .column(DAY_OF_WEEK_FIELD)?
            .as_materialized_series()
            .str()?
            .into_iter()
            .map(|opt| Some(opt.unwrap_or("Monday")))
            .collect();

        let mut result = derived.clone();
        result = result
            .with_column(hours.with_name(HOUR_FIELD.into()).into_series())?
            .clone();
        result = result
            .with_column(days.with_name(DAY_OF_WEEK_FIELD.into()).into_series())?
            .clone();
        Ok(result)
    } else {
        let hours: Vec<f64> = (0..n).map(|_| rng.gen_range(0..24) as f64).collect();
        let days: Vec<&str> = (0..n)
            .map(|_| DAY_NAMES[rng.gen_range(0..DAY_NAMES.len())])
            .collect();

        let mut result = df.clone();
        result = result
            .with_column(Series::new(HOUR_FIELD.into(), hours))?
            .clone();
        result = result
            .with_column(Series::new(DAY_OF_WEEK_FIELD.into(), days))?
            .clone();
        Ok(result)
    }
}

/// Push the injected rows away from the data mass along every known
/// numeric field
fn shift_numeric_fields(df: &DataFrame, rows: &[usize], shift: f64) -> Result<DataFrame> {
    let mut result = df.clone();

    for field in schema::numeric_vocabulary() {
        let Ok(column) = df.column(field) else {
            continue;
        };
        let casted = column.as_materialized_series().cast(&DataType::Float64)?;
        let mut values: Vec<Option<f64>> = casted.f64()?.into_iter().collect();
        for &row in rows {
            values[row] = Some(values[row].unwrap_or(0.0) + shift);
        }

        let shifted: Float64Chunked = values.into_iter().collect();
        result = result
            .with_column(shifted.with_name((*field).into()).into_series())?
            .clone();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_df() -> DataFrame {
        let mut names = Vec::new();
        let mut scores = Vec::new();
        for i in 0..200 {
            names.push(if i % 2 == 0 { "web-01" } else { "web-02" });
            scores.push(60.0 + (i % 10) as f64);
        }
        df!(
            "agent.name" => names,
            "data.sca.score" => scores,
        )
        .unwrap()
    }

    #[test]
    fn test_sample_size_and_labels() {
        let df = base_df();
        let config = SyntheticConfig::default();
        let testset = generate_labeled_testset(&df, &config).unwrap();

        assert_eq!(testset.height(), 100);
        let labels = testset.column(LABEL_COLUMN).unwrap().i32().unwrap();
        let n_anomalies = labels.into_iter().filter(|l| *l == Some(-1)).count();
        assert_eq!(n_anomalies, 5);
    }

    #[test]
    fn test_time_features_backfilled() {
        let df = base_df();
        let testset = generate_labeled_testset(&df, &SyntheticConfig::default()).unwrap();
        let hours = testset.column(HOUR_FIELD).unwrap().f64().unwrap();
        assert!(hours.into_iter().all(|h| {
            let h = h.unwrap();
            (0.0..24.0).contains(&h)
        }));
        assert!(testset.column(DAY_OF_WEEK_FIELD).is_ok());
    }

    #[test]
    fn test_injected_rows_are_shifted() {
        let df = base_df();
        let config = SyntheticConfig {
            outlier_shift: 1000.0,
            ..SyntheticConfig::default()
        };
        let testset = generate_labeled_testset(&df, &config).unwrap();

        let labels = testset.column(LABEL_COLUMN).unwrap().i32().unwrap();
        let scores = testset.column("data.sca.score").unwrap().f64().unwrap();
        for (label, score) in labels.into_iter().zip(scores.into_iter()) {
            let score = score.unwrap();
            if label == Some(-1) {
                assert!(score > 900.0);
            } else {
                assert!(score < 100.0);
            }
        }
    }

    #[test]
    fn test_deterministic_under_seed() {
        let df = base_df();
        let config = SyntheticConfig::default();
        let a = generate_labeled_testset(&df, &config).unwrap();
        let b = generate_labeled_testset(&df, &config).unwrap();
        assert_eq!(
            a.column(LABEL_COLUMN).unwrap().i32().unwrap().get(3),
            b.column(LABEL_COLUMN).unwrap().i32().unwrap().get(3)
        );
    }

    #[test]
    fn test_empty_table_rejected() {
        let df = base_df().head(Some(0));
        assert!(generate_labeled_testset(&df, &SyntheticConfig::default()).is_err());
    }
}
