//! Integration test: feature pipeline and raw-table diagnostics over data frames

use beverage_quality::analysis::{analyze, augment, AugmentConfig};
use beverage_quality::error::QualityError;
use beverage_quality::preprocessing::{FeaturePipeline, LabelEncoder};
use beverage_quality::utils::column_labels;
use polars::prelude::*;

fn sample_df() -> DataFrame {
    df!(
        "pH" => &[Some(6.6), Some(6.8), None, Some(6.4), Some(9.5), Some(3.0)],
        "Temprature" => &[Some(35.0), Some(40.0), Some(45.0), None, Some(70.0), Some(34.0)],
        "Grade" => &["high", "high", "medium", "medium", "low", "low"],
    )
    .unwrap()
}

fn features() -> Vec<String> {
    vec!["pH".to_string(), "Temprature".to_string()]
}

#[test]
fn test_pipeline_fit_transform_imputes_and_scales() {
    let df = sample_df();
    let mut pipeline = FeaturePipeline::new(features(), false);
    let x = pipeline.fit_transform(&df).unwrap();

    assert_eq!(x.dim(), (6, 2));
    assert!(x.iter().all(|v| v.is_finite()), "no missing values survive");
    // Medians of the observed cells
    assert_eq!(pipeline.imputer().medians(), &[6.6, 40.0]);
    for column in x.columns() {
        assert!(column.mean().unwrap().abs() < 1e-12);
    }
    assert!(pipeline.is_fitted());
    assert!(pipeline.fit_time().is_some());
}

#[test]
fn test_polynomial_expansion_names() {
    let df = sample_df();
    let mut pipeline = FeaturePipeline::new(features(), true);
    let x = pipeline.fit_transform(&df).unwrap();

    assert_eq!(x.ncols(), 5);
    assert_eq!(pipeline.n_output_features(), 5);
    assert_eq!(pipeline.output_feature_names().len(), 5);
    assert_eq!(&pipeline.output_feature_names()[..2], &features()[..]);
}

#[test]
fn test_transform_uses_training_statistics() {
    let mut pipeline = FeaturePipeline::new(features(), false);
    pipeline.fit(&sample_df()).unwrap();

    // Column order in the frame does not matter, the declared order does
    let test = df!(
        "Temprature" => &[None, Some(40.0)],
        "pH" => &[Some(6.6), None],
    )
    .unwrap();
    let x = pipeline.transform(&test).unwrap();
    let centered = pipeline.transform_matrix(&ndarray::array![[6.6, 40.0]]).unwrap();
    assert_eq!(x.row(0), centered.row(0));
    assert_eq!(x.row(1), centered.row(0));
}

#[test]
fn test_missing_column_is_schema_error() {
    let mut pipeline = FeaturePipeline::new(features(), false);
    pipeline.fit(&sample_df()).unwrap();

    let test = df!("pH" => &[6.6]).unwrap();
    match pipeline.transform(&test) {
        Err(QualityError::Schema(message)) => assert!(message.contains("Temprature")),
        other => panic!("expected a schema error, got {:?}", other),
    }
}

#[test]
fn test_unfitted_pipeline_refuses_to_transform() {
    let pipeline = FeaturePipeline::new(features(), false);
    assert!(matches!(pipeline.transform(&sample_df()), Err(QualityError::ModelNotFitted)));
}

#[test]
fn test_label_encoder_from_frame_keeps_first_seen_order() {
    let labels = column_labels(&sample_df(), "Grade").unwrap();
    let mut encoder = LabelEncoder::new();
    encoder.fit(&labels).unwrap();
    assert_eq!(encoder.encode("high").unwrap(), 0);
    assert_eq!(encoder.encode("medium").unwrap(), 1);
    assert_eq!(encoder.encode("low").unwrap(), 2);
}

#[test]
fn test_analysis_and_augmentation_on_frame() {
    let df = df!(
        "a" => &[1.0, 1.0, 2.0, 3.0],
        "b" => &[5.0, 5.0, 6.0, 6.0],
        "target" => &[0i64, 0, 1, 1],
    )
    .unwrap();
    let report = analyze(&df, "target").unwrap();
    assert_eq!(report.rows, 4);
    assert_eq!(report.duplicate_rows, 1);
    assert_eq!(report.conflicting_near_duplicates, 0);

    let augmented = augment(&df, "target", &AugmentConfig::default().with_target_rows(10)).unwrap();
    assert_eq!(augmented.height(), 10);
    assert_eq!(augmented.get_column_names(), df.get_column_names());
}
