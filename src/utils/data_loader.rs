//! Data loading utilities

use crate::error::{LogSentinelError, Result};
use polars::prelude::*;
use rand::prelude::*;
use std::fs::File;
use tracing::info;

/// Loader for raw log tables
pub struct DataLoader {
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            infer_schema_length: 100,
        }
    }

    pub fn with_infer_schema_length(mut self, n: usize) -> Self {
        self.infer_schema_length = n;
        self
    }

    /// Load a CSV file
    pub fn load_csv(&self, path: &str) -> Result<DataFrame> {
        let file =
            File::open(path).map_err(|e| LogSentinelError::Data(format!("{path}: {e}")))?;

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .into_reader_with_file_handle(file)
            .finish()?;

        info!(rows = df.height(), columns = df.width(), path, "loaded csv");
        Ok(df)
    }

    /// Load a line-delimited JSON file
    pub fn load_json(&self, path: &str) -> Result<DataFrame> {
        let file =
            File::open(path).map_err(|e| LogSentinelError::Data(format!("{path}: {e}")))?;

        let df = JsonReader::new(file).finish()?;
        info!(rows = df.height(), columns = df.width(), path, "loaded json");
        Ok(df)
    }

    /// Detect file format from the extension and load
    pub fn load_auto(&self, path: &str) -> Result<DataFrame> {
        let lower = path.to_lowercase();
        if lower.ends_with(".json") || lower.ends_with(".jsonl") {
            self.load_json(path)
        } else {
            self.load_csv(path)
        }
    }
}

/// Seeded random row sample of at most `n` rows
pub fn sample_rows(df: &DataFrame, n: usize, seed: u64) -> Result<DataFrame> {
    let height = df.height();
    if n >= height {
        return Ok(df.clone());
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices: Vec<u32> = rand::seq::index::sample(&mut rng, height, n)
        .into_iter()
        .map(|i| i as u32)
        .collect();
    indices.sort_unstable();

    let idx = UInt32Chunked::from_vec("idx".into(), indices);
    Ok(df.take(&idx)?)
}

/// Write a table to CSV
pub fn save_csv(df: &mut DataFrame, path: &str) -> Result<()> {
    let mut file =
        File::create(path).map_err(|e| LogSentinelError::Data(format!("{path}: {e}")))?;
    CsvWriter::new(&mut file).finish(df)?;
    info!(rows = df.height(), path, "saved csv");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_round_trip() {
        let mut df = df!(
            "agent.name" => &["web-01", "web-02"],
            "data.sca.score" => &[75.0, 80.0],
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.csv");
        let path = path.to_str().unwrap();

        save_csv(&mut df, path).unwrap();
        let loaded = DataLoader::new().load_csv(path).unwrap();
        assert_eq!(loaded.height(), 2);
        assert_eq!(loaded.width(), 2);
    }

    #[test]
    fn test_sample_rows_seeded() {
        let df = df!("x" => (0..100).map(|i| i as f64).collect::<Vec<_>>()).unwrap();
        let a = sample_rows(&df, 10, 7).unwrap();
        let b = sample_rows(&df, 10, 7).unwrap();
        assert_eq!(a.height(), 10);
        assert_eq!(
            a.column("x").unwrap().f64().unwrap().get(0),
            b.column("x").unwrap().f64().unwrap().get(0)
        );
    }

    #[test]
    fn test_sample_larger_than_table() {
        let df = df!("x" => &[1.0, 2.0]).unwrap();
        let sampled = sample_rows(&df, 10, 7).unwrap();
        assert_eq!(sampled.height(), 2);
    }

    #[test]
    fn test_missing_file_is_data_error() {
        let err = DataLoader::new().load_csv("/nonexistent/logs.csv").unwrap_err();
        assert!(matches!(err, LogSentinelError::Data(_)));
    }
}
