//! Integration tests: schema-driven preprocessing end-to-end

use logsentinel::preprocessing::{
    FeatureMatrix, Preprocessor, PreprocessorConfig, MISSING_CATEGORY,
};
use logsentinel::schema::FeatureSchema;
use polars::prelude::*;

fn training_df() -> DataFrame {
    df!(
        "agent.name" => &["web-01", "web-02", "db-01", "web-01", "db-01"],
        "agent.ip" => &["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.1", "10.0.0.3"],
        "data.alert_type" => &["auth_failure", "sca", "vuln", "auth_failure", "sca"],
        "data.sca.score" => &[75.0, 80.0, 60.0, 90.0, 85.0],
        "data.win.system.eventID" => &[4625.0, 4624.0, 4688.0, 4625.0, 4624.0],
        "data.timestamp" => &[
            "2024-03-04T14:30:00Z",
            "2024-03-04T15:00:00Z",
            "2024-03-05T02:10:00Z",
            "2024-03-06T09:45:00Z",
            "2024-03-07T23:59:00Z",
        ],
    )
    .unwrap()
}

#[test]
fn test_schema_stability_across_row_counts() {
    let df = training_df();
    let schema = FeatureSchema::build(&df).unwrap();
    let expected_cols = schema.column_count();

    let mut preprocessor = Preprocessor::new(schema);
    preprocessor.fit(&df).unwrap();

    // Full table
    let full = preprocessor.transform(&df).unwrap();
    assert_eq!(full.ncols(), expected_cols);
    assert_eq!(full.nrows(), 5);

    // Single row
    let single = preprocessor.transform(&df.head(Some(1))).unwrap();
    assert_eq!(single.ncols(), expected_cols);
    assert_eq!(single.nrows(), 1);

    // Empty but field-complete
    let empty = preprocessor.transform(&df.head(Some(0))).unwrap();
    assert_eq!(empty.ncols(), expected_cols);
    assert_eq!(empty.nrows(), 0);
}

#[test]
fn test_default_filling_idempotence() {
    let df = training_df();
    let schema = FeatureSchema::build(&df).unwrap();
    let mut preprocessor = Preprocessor::new(schema);
    preprocessor.fit(&df).unwrap();

    let absent = df!(
        "agent.name" => &["web-01"],
        "data.sca.score" => &[80.0],
        "data.timestamp" => &["2024-03-04T14:30:00Z"],
    )
    .unwrap();
    let explicit = df!(
        "agent.name" => &["web-01"],
        "agent.ip" => &[MISSING_CATEGORY],
        "data.alert_type" => &[MISSING_CATEGORY],
        "data.sca.score" => &[80.0],
        "data.timestamp" => &["2024-03-04T14:30:00Z"],
    )
    .unwrap();

    let a = preprocessor.transform(&absent).unwrap().into_dense();
    let b = preprocessor.transform(&explicit).unwrap().into_dense();
    assert_eq!(a.dim(), b.dim());
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x - y).abs() < 1e-12, "absent-field and explicit-default rows diverged");
    }
}

#[test]
fn test_unseen_category_robustness() {
    let df = training_df();
    let schema = FeatureSchema::build(&df).unwrap();
    let mut preprocessor = Preprocessor::new(schema);
    preprocessor.fit(&df).unwrap();

    let unseen = df!(
        "agent.name" => &["never-seen-host"],
        "agent.ip" => &["192.168.99.99"],
        "data.alert_type" => &["zero_day"],
        "data.sca.score" => &[10.0],
        "data.win.system.eventID" => &[1102.0],
        "data.timestamp" => &["2024-03-08T01:00:00Z"],
    )
    .unwrap();

    let matrix = preprocessor.transform(&unseen).unwrap();
    let dense = matrix.into_dense();
    assert_eq!(dense.nrows(), 1);
    assert!(dense.iter().all(|v| v.is_finite()));
}

#[test]
fn test_sparse_output_matches_dense() {
    let df = training_df();
    let schema = FeatureSchema::build(&df).unwrap();

    let mut dense_pre = Preprocessor::new(schema.clone());
    let dense = dense_pre.fit_transform(&df).unwrap().into_dense();

    let mut sparse_pre = Preprocessor::with_config(
        schema,
        PreprocessorConfig {
            sparse_output: true,
            ..PreprocessorConfig::default()
        },
    );
    let sparse = sparse_pre.fit_transform(&df).unwrap();
    assert!(matches!(sparse, FeatureMatrix::Sparse(_)));

    let expanded = sparse.into_dense();
    for (x, y) in dense.iter().zip(expanded.iter()) {
        assert!((x - y).abs() < 1e-12);
    }
}

#[test]
fn test_list_valued_cell_is_transform_error() {
    let df = training_df();
    let schema = FeatureSchema::build(&df).unwrap();
    let mut preprocessor = Preprocessor::new(schema);
    preprocessor.fit(&df).unwrap();

    let scores = Series::new(
        "data.sca.score".into(),
        &[Series::new("".into(), &[1.0, 2.0]), Series::new("".into(), &[3.0])],
    );
    let bad = DataFrame::new(vec![scores.into()]).unwrap();

    let err = preprocessor.transform(&bad).unwrap_err();
    assert!(matches!(
        err,
        logsentinel::LogSentinelError::Transform(_)
    ));
    assert!(err.to_string().contains("data.sca.score"));
}

#[test]
fn test_preprocessor_round_trip() {
    let df = training_df();
    let schema = FeatureSchema::build(&df).unwrap();
    let mut preprocessor = Preprocessor::new(schema.clone());
    let before = preprocessor.fit_transform(&df).unwrap().into_dense();

    let dir = tempfile::tempdir().unwrap();
    let schema_path = dir.path().join("schema.json");
    let pre_path = dir.path().join("preprocessor.json");

    schema.save(schema_path.to_str().unwrap()).unwrap();
    preprocessor.save(pre_path.to_str().unwrap()).unwrap();

    let loaded_schema = FeatureSchema::load(schema_path.to_str().unwrap()).unwrap();
    assert_eq!(loaded_schema, schema);

    let loaded = Preprocessor::load(pre_path.to_str().unwrap()).unwrap();
    let after = loaded.transform(&df).unwrap().into_dense();
    for (x, y) in before.iter().zip(after.iter()) {
        assert!((x - y).abs() < 1e-12);
    }
}
