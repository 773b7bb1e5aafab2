//! Feature schema: the declarative record of which log fields are
//! categorical vs numeric, persisted so that training-time and
//! inference-time feature sets stay identical.

use crate::error::{LogSentinelError, Result};
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Timestamp column used to derive time features
pub const TIMESTAMP_FIELD: &str = "data.timestamp";
/// Derived numeric hour-of-day field (0-23)
pub const HOUR_FIELD: &str = "hour";
/// Derived categorical day-of-week field
pub const DAY_OF_WEEK_FIELD: &str = "day_of_week";

/// Categorical log attributes the pipeline knows how to consume.
/// Order matters: it defines the categorical block's column order.
const CATEGORICAL_VOCABULARY: &[&str] = &[
    "agent.name",
    "agent.ip",
    "data.alert_type",
    "data.win.system.channel",
    "data.win.system.providerName",
    "data.win.eventdata.processName",
    "data.win.eventdata.user",
    "data.win.eventdata.ruleName",
    "data.win.system.severityValue",
];

/// Numeric log attributes the pipeline knows how to consume.
const NUMERIC_VOCABULARY: &[&str] = &[
    "data.sca.score",
    "data.sca.total_checks",
    "data.vulnerability.cvss.cvss3.base_score",
    "data.win.system.eventID",
];

/// The categorical half of the domain vocabulary
pub fn categorical_vocabulary() -> &'static [&'static str] {
    CATEGORICAL_VOCABULARY
}

/// The numeric half of the domain vocabulary
pub fn numeric_vocabulary() -> &'static [&'static str] {
    NUMERIC_VOCABULARY
}

/// Ordered categorical/numeric field lists for one training run.
///
/// Built once during the fit flow, serialized, and loaded unmodified for
/// every subsequent score flow. Never mutated after creation; a schema
/// change requires re-fitting the preprocessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub categorical: Vec<String>,
    pub numeric: Vec<String>,
}

impl FeatureSchema {
    /// Build a schema by intersecting the domain vocabulary with the
    /// training table's columns. Derived time fields are added only when
    /// a timestamp column is present: fields never observed during fit do
    /// not exist for scoring either.
    pub fn build(df: &DataFrame) -> Result<Self> {
        if df.height() == 0 {
            return Err(LogSentinelError::Schema(
                "training table is empty".to_string(),
            ));
        }

        let columns: Vec<&str> = df.get_column_names().iter().map(|n| n.as_str()).collect();

        let mut categorical: Vec<String> = CATEGORICAL_VOCABULARY
            .iter()
            .filter(|f| columns.contains(f))
            .map(|f| f.to_string())
            .collect();

        let mut numeric: Vec<String> = NUMERIC_VOCABULARY
            .iter()
            .filter(|f| columns.contains(f))
            .map(|f| f.to_string())
            .collect();

        if columns.contains(&TIMESTAMP_FIELD) {
            numeric.push(HOUR_FIELD.to_string());
            categorical.push(DAY_OF_WEEK_FIELD.to_string());
        }

        if categorical.is_empty() && numeric.is_empty() {
            return Err(LogSentinelError::Schema(format!(
                "no known categorical or numeric fields among columns {:?}",
                columns
            )));
        }

        info!(
            n_categorical = categorical.len(),
            n_numeric = numeric.len(),
            "built feature schema"
        );

        Ok(Self {
            categorical,
            numeric,
        })
    }

    /// Total number of feature columns the preprocessor will emit
    pub fn column_count(&self) -> usize {
        self.categorical.len() + self.numeric.len()
    }

    /// Whether a field belongs to the schema (either list)
    pub fn contains(&self, field: &str) -> bool {
        self.categorical.iter().any(|f| f == field) || self.numeric.iter().any(|f| f == field)
    }

    /// Whether the schema carries the derived time fields
    pub fn has_time_features(&self) -> bool {
        self.numeric.iter().any(|f| f == HOUR_FIELD)
            || self.categorical.iter().any(|f| f == DAY_OF_WEEK_FIELD)
    }

    /// Save the schema to a JSON file
    pub fn save(&self, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|e| LogSentinelError::Artifact(format!("cannot write schema {path}: {e}")))?;
        Ok(())
    }

    /// Load a schema from a JSON file
    pub fn load(path: &str) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| LogSentinelError::Artifact(format!("cannot read schema {path}: {e}")))?;
        let schema: Self = serde_json::from_str(&json)
            .map_err(|e| LogSentinelError::Artifact(format!("corrupt schema {path}: {e}")))?;
        Ok(schema)
    }
}

/// Parse one timestamp cell. Accepts RFC 3339 and the bare formats the
/// log shippers emit.
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    None
}

fn day_name(dt: &NaiveDateTime) -> &'static str {
    match dt.weekday() {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
}

/// Collect timestamps from the column regardless of physical dtype.
fn column_timestamps(df: &DataFrame) -> Result<Vec<Option<NaiveDateTime>>> {
    let column = df.column(TIMESTAMP_FIELD)?;
    let series = column.as_materialized_series();

    match series.dtype() {
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let physical = series.cast(&DataType::Int64)?;
            let ca = physical.i64()?;
            Ok(ca
                .into_iter()
                .map(|opt| {
                    opt.and_then(|v| {
                        let (secs, nanos) = match unit {
                            TimeUnit::Nanoseconds => (v.div_euclid(1_000_000_000), v.rem_euclid(1_000_000_000)),
                            TimeUnit::Microseconds => (v.div_euclid(1_000_000), v.rem_euclid(1_000_000) * 1_000),
                            TimeUnit::Milliseconds => (v.div_euclid(1_000), v.rem_euclid(1_000) * 1_000_000),
                        };
                        DateTime::from_timestamp(secs, nanos as u32).map(|dt| dt.naive_utc())
                    })
                })
                .collect())
        }
        _ => {
            let as_str = series.cast(&DataType::String)?;
            let ca = as_str.str()?;
            Ok(ca
                .into_iter()
                .map(|opt| opt.and_then(parse_timestamp))
                .collect())
        }
    }
}

/// Add derived `hour` and `day_of_week` columns when a timestamp column is
/// present; unparseable cells become nulls and are later handled by the
/// fitted imputers. Tables without a timestamp pass through unchanged.
pub fn derive_time_features(df: &DataFrame) -> Result<DataFrame> {
    let columns: Vec<&str> = df.get_column_names().iter().map(|n| n.as_str()).collect();
    if !columns.contains(&TIMESTAMP_FIELD) {
        return Ok(df.clone());
    }

    let stamps = column_timestamps(df)?;

    let hours: Float64Chunked = stamps
        .iter()
        .map(|opt| opt.as_ref().map(|dt| dt.hour() as f64))
        .collect();
    let days: StringChunked = stamps
        .iter()
        .map(|opt| opt.as_ref().map(day_name))
        .collect();

    let mut result = df.clone();
    result = result
        .with_column(hours.with_name(HOUR_FIELD.into()).into_series())?
        .clone();
    result = result
        .with_column(days.with_name(DAY_OF_WEEK_FIELD.into()).into_series())?
        .clone();

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_df() -> DataFrame {
        df!(
            "agent.name" => &["web-01", "web-02", "db-01"],
            "data.alert_type" => &["auth_failure", "sca", "vuln"],
            "data.sca.score" => &[75.0, 80.0, 60.0],
            "irrelevant" => &[1.0, 2.0, 3.0],
        )
        .unwrap()
    }

    #[test]
    fn test_build_intersects_vocabulary() {
        let schema = FeatureSchema::build(&sample_df()).unwrap();
        assert_eq!(schema.categorical, vec!["agent.name", "data.alert_type"]);
        assert_eq!(schema.numeric, vec!["data.sca.score"]);
        assert!(!schema.contains("irrelevant"));
    }

    #[test]
    fn test_build_rejects_degenerate_table() {
        let df = df!("irrelevant" => &[1.0, 2.0]).unwrap();
        let err = FeatureSchema::build(&df).unwrap_err();
        assert!(matches!(err, LogSentinelError::Schema(_)));
    }

    #[test]
    fn test_build_rejects_empty_table() {
        let df = df!("agent.name" => &[] as &[&str]).unwrap();
        assert!(FeatureSchema::build(&df).is_err());
    }

    #[test]
    fn test_time_features_added_when_timestamp_present() {
        let df = df!(
            "agent.name" => &["web-01", "web-02"],
            "data.timestamp" => &["2024-03-04T14:30:00Z", "2024-03-05T02:00:00Z"],
        )
        .unwrap();
        let schema = FeatureSchema::build(&df).unwrap();
        assert!(schema.numeric.contains(&HOUR_FIELD.to_string()));
        assert!(schema.categorical.contains(&DAY_OF_WEEK_FIELD.to_string()));
        assert!(schema.has_time_features());
    }

    #[test]
    fn test_derive_time_features_values() {
        let df = df!(
            "data.timestamp" => &["2024-03-04T14:30:00Z", "not a date"],
        )
        .unwrap();
        let derived = derive_time_features(&df).unwrap();

        let hours = derived.column(HOUR_FIELD).unwrap().f64().unwrap();
        assert_eq!(hours.get(0), Some(14.0));
        assert_eq!(hours.get(1), None);

        let days = derived.column(DAY_OF_WEEK_FIELD).unwrap().str().unwrap();
        // 2024-03-04 was a Monday
        assert_eq!(days.get(0), Some("Monday"));
        assert_eq!(days.get(1), None);
    }

    #[test]
    fn test_derive_passthrough_without_timestamp() {
        let df = sample_df();
        let derived = derive_time_features(&df).unwrap();
        assert_eq!(derived.width(), df.width());
    }

    #[test]
    fn test_schema_round_trip() {
        let schema = FeatureSchema::build(&sample_df()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        let path = path.to_str().unwrap();

        schema.save(path).unwrap();
        let loaded = FeatureSchema::load(path).unwrap();
        assert_eq!(schema, loaded);
    }

    #[test]
    fn test_load_missing_is_artifact_error() {
        let err = FeatureSchema::load("/nonexistent/schema.json").unwrap_err();
        assert!(matches!(err, LogSentinelError::Artifact(_)));
    }
}
