//! Integration tests: split → preprocess → select → persist → predict

use beverage_quality::config::PipelineConfig;
use beverage_quality::dataset::{DatasetDescriptor, DatasetId};
use beverage_quality::error::ErrorKind;
use beverage_quality::inference::InferenceService;
use beverage_quality::ingestion::{DatasetSplitter, SplitConfig};
use beverage_quality::pipeline::{Objective, TrainingPipeline};
use beverage_quality::preprocessing::FeatureRecord;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Water table where potability requires pH in 6.5..=8.5 and turbidity below 4.
/// Every tenth row leaves `Sulfate` empty.
fn write_water_csv(dir: &Path, rows: usize) {
    let mut csv = String::from(
        "ph,Hardness,Solids,Chloramines,Sulfate,Conductivity,Organic_carbon,Trihalomethanes,Turbidity,Potability\n",
    );
    for i in 0..rows {
        let ph = 5.0 + (i % 10) as f64 * 0.5;
        let turbidity = 2.0 + (i % 7) as f64 * 0.5;
        let sulfate = if i % 10 == 3 { String::new() } else { format!("{:.1}", 300.0 + (i % 13) as f64) };
        let potable = (6.5..=8.5).contains(&ph) && turbidity < 4.0;
        writeln!(
            csv,
            "{:.2},{:.1},{:.1},{:.2},{},{:.1},{:.2},{:.2},{:.2},{}",
            ph,
            180.0 + (i % 11) as f64,
            20000.0 + (i % 17) as f64 * 100.0,
            7.0 + (i % 5) as f64 * 0.1,
            sulfate,
            420.0 + (i % 9) as f64,
            14.0 + (i % 3) as f64 * 0.5,
            66.0 + (i % 4) as f64,
            turbidity,
            potable as u8
        )
        .unwrap();
    }
    fs::write(dir.join("water.csv"), csv).unwrap();
}

/// Milk table graded by pH and temperature: `high` for pH 6.6 or 6.8 at
/// 40 degrees or below, `low` for extreme pH or 70 degrees and above.
fn write_milk_csv(dir: &Path, rows: usize) {
    const PH: [f64; 8] = [3.0, 4.5, 6.4, 6.6, 6.8, 7.0, 8.5, 9.0];
    const TEMPERATURE: [f64; 5] = [4.0, 20.0, 37.0, 55.0, 80.0];
    let mut csv = String::from("pH,Temprature,Taste,Odor,Fat ,Turbidity,Colour,Grade\n");
    for i in 0..rows {
        let ph = PH[i % PH.len()];
        let temperature = TEMPERATURE[i % TEMPERATURE.len()];
        let grade = if (6.5..=6.9).contains(&ph) && temperature <= 40.0 {
            "high"
        } else if !(6.0..=7.8).contains(&ph) || temperature >= 70.0 {
            "low"
        } else {
            "medium"
        };
        writeln!(
            csv,
            "{:.1},{:.0},{},{},{},{},{},{}",
            ph,
            temperature,
            i % 2,
            (i / 3) % 2,
            (i / 2) % 2,
            (i / 5) % 2,
            240 + i % 16,
            grade
        )
        .unwrap();
    }
    fs::write(dir.join("milk.csv"), csv).unwrap();
}

/// Wine table whose quality follows alcohol alone, with a trailing `Id`
/// column that tracks the row number.
fn write_wine_csv(dir: &Path, rows: usize) {
    let mut csv = String::from(
        "fixed acidity,volatile acidity,citric acid,residual sugar,chlorides,free sulfur dioxide,\
         total sulfur dioxide,density,pH,sulphates,alcohol,quality,Id\n",
    );
    for i in 0..rows {
        let alcohol = 8.5 + (i % 10) as f64 * 0.5;
        let quality = if alcohol >= 12.0 {
            8
        } else if alcohol >= 10.5 {
            6
        } else if alcohol >= 9.5 {
            5
        } else {
            4
        };
        writeln!(
            csv,
            "{:.1},{:.2},{:.2},{:.1},{:.3},{:.0},{:.0},{:.4},{:.2},{:.2},{:.1},{},{}",
            7.0 + (i % 7) as f64 * 0.3,
            0.4 + (i % 3) as f64 * 0.1,
            0.2 + (i % 4) as f64 * 0.05,
            1.8 + (i % 5) as f64 * 0.2,
            0.07 + (i % 6) as f64 * 0.002,
            10.0 + (i % 9) as f64,
            30.0 + (i % 11) as f64 * 2.0,
            0.9960 + (i % 8) as f64 * 0.0002,
            3.2 + (i % 3) as f64 * 0.05,
            0.55 + (i % 4) as f64 * 0.05,
            alcohol,
            quality,
            i
        )
        .unwrap();
    }
    fs::write(dir.join("wine.csv"), csv).unwrap();
}

fn config_for(root: &Path) -> PipelineConfig {
    PipelineConfig::new()
        .with_data_dir(root.join("Dataset"))
        .with_split_dir(root.join("data"))
        .with_artifact_dir(root.join("artifact"))
        .with_cv_folds(2, 3)
}

fn water_record(ph: f64, turbidity: f64) -> FeatureRecord {
    FeatureRecord::new()
        .with("ph", ph)
        .with("Hardness", 185.0)
        .with("Solids", 20800.0)
        .with("Chloramines", 7.2)
        .with("Sulfate", 306.0)
        .with("Conductivity", 424.0)
        .with("Organic_carbon", 14.5)
        .with("Trihalomethanes", 67.0)
        .with("Turbidity", turbidity)
}

// ============================================================================
// Ingestion
// ============================================================================

#[test]
fn test_split_is_idempotent_and_reproducible() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir_all(root.path().join("Dataset")).unwrap();
    write_water_csv(&root.path().join("Dataset"), 50);

    let config = SplitConfig {
        data_dir: root.path().join("Dataset"),
        split_dir: root.path().join("data"),
        ..SplitConfig::default()
    };
    let splitter = DatasetSplitter::new(config);
    let descriptor = DatasetDescriptor::water();

    let first = splitter.split(&descriptor).unwrap();
    assert!(!first.reused);
    assert_eq!(first.test_rows, Some(10));
    assert_eq!(first.train_rows, Some(40));
    let train_bytes = fs::read(&first.train_path).unwrap();
    let test_bytes = fs::read(&first.test_path).unwrap();

    let second = splitter.split(&descriptor).unwrap();
    assert!(second.reused);
    assert!(second.elapsed.is_zero());
    assert_eq!(fs::read(&second.train_path).unwrap(), train_bytes);
    assert_eq!(fs::read(&second.test_path).unwrap(), test_bytes);

    // Same seed, fresh directory: identical files
    fs::remove_file(&first.train_path).unwrap();
    fs::remove_file(&first.test_path).unwrap();
    let third = splitter.split(&descriptor).unwrap();
    assert!(!third.reused);
    assert_eq!(fs::read(&third.train_path).unwrap(), train_bytes);
    assert_eq!(fs::read(&third.test_path).unwrap(), test_bytes);

    let raw = descriptor.split_paths(&root.path().join("data")).raw;
    assert_eq!(fs::read(raw).unwrap(), fs::read(root.path().join("Dataset/water.csv")).unwrap());
}

#[test]
fn test_missing_source_is_ingestion_error() {
    let root = tempfile::tempdir().unwrap();
    let splitter = DatasetSplitter::new(SplitConfig {
        data_dir: root.path().join("nowhere"),
        split_dir: root.path().join("data"),
        ..SplitConfig::default()
    });
    let err = splitter.split(&DatasetDescriptor::milk()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Ingestion);
    assert!(!root.path().join("data/milk_train.csv").exists());
}

// ============================================================================
// End-to-end training
// ============================================================================

#[test]
fn test_water_training_and_directional_prediction() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir_all(root.path().join("Dataset")).unwrap();
    write_water_csv(&root.path().join("Dataset"), 140);

    let pipeline = TrainingPipeline::new(config_for(root.path())).unwrap();
    let report = pipeline.run(&DatasetDescriptor::water()).unwrap();

    assert_eq!(report.dataset, DatasetId::Water);
    assert_eq!(report.bundle_version, 1);
    assert_eq!(report.train_rows + report.test_rows + report.dropped_test_rows, 140);
    assert_eq!(report.selection.candidate_scores.len() + report.selection.failures.len(), 9);
    assert!(report.selection.test_accuracy > 0.8, "accuracy {}", report.selection.test_accuracy);
    assert!(report.report_path.exists());

    let json: serde_json::Value = serde_json::from_slice(&fs::read(&report.report_path).unwrap()).unwrap();
    assert_eq!(json["dataset"], "water");

    let service = InferenceService::new(DatasetDescriptor::water(), &pipeline.store());
    let prediction = service.predict(&water_record(9.5, 4.5)).unwrap();
    assert_eq!(prediction.label, "bad");
    assert_eq!(prediction.raw_label, "0");
}

#[test]
fn test_milk_training_with_polynomial_features() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir_all(root.path().join("Dataset")).unwrap();
    write_milk_csv(&root.path().join("Dataset"), 200);

    let pipeline = TrainingPipeline::new(config_for(root.path())).unwrap();
    let report = pipeline.run(&DatasetDescriptor::milk()).unwrap();

    assert_eq!(report.dataset, DatasetId::Milk);
    assert_eq!(report.objective, Objective::Classification);
    assert_eq!(report.input_features.len(), 7);
    // 7 inputs plus 28 degree-2 products
    assert_eq!(report.output_features, 35);
    let mut classes = report.classes.clone();
    classes.sort();
    assert_eq!(classes, vec!["high", "low", "medium"]);
    assert_eq!(report.selection.candidate_scores.len() + report.selection.failures.len(), 9);
    assert!(report.selection.test_accuracy > 0.8, "accuracy {}", report.selection.test_accuracy);
    let matrix_total: usize = report.selection.confusion_matrix.iter().flatten().sum();
    assert_eq!(matrix_total, report.test_rows);

    let service = InferenceService::new(DatasetDescriptor::milk(), &pipeline.store());
    let reference = FeatureRecord::new()
        .with("pH", 6.8)
        .with("Temprature", 4.0)
        .with("Colour", 252.0)
        .with("Taste", 1.0)
        .with("Odor", 0.0)
        .with("Fat", 1.0)
        .with("Turbidity", 0.0);
    let prediction = service.predict(&reference).unwrap();
    assert_eq!(prediction.label, "high");
    assert_eq!(prediction.raw_label, "high");
}

#[test]
fn test_wine_best_of_n_ignores_id_column() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir_all(root.path().join("Dataset")).unwrap();
    write_wine_csv(&root.path().join("Dataset"), 120);

    let config = config_for(root.path()).with_wine_search(2, 0.7);
    let pipeline = TrainingPipeline::new(config).unwrap();
    let report = pipeline.run(&DatasetDescriptor::wine()).unwrap();

    assert_eq!(report.dataset, DatasetId::Wine);
    assert_eq!(report.objective, Objective::Classification);
    assert_eq!(report.selection.model_family, "StackingClassifier");
    let attempts = report.selection.candidate_scores.len() + report.selection.failures.len();
    assert!((1..=2).contains(&attempts), "attempts {}", attempts);
    assert_eq!(report.input_features.len(), 11);
    assert!(!report.input_features.iter().any(|f| f == "Id"));
    assert_eq!(report.output_features, 11);
    assert_eq!(report.classes.len(), 4);

    let bundle = pipeline.store().load_bundle(DatasetId::Wine).unwrap();
    assert!(!bundle.pipeline.output_feature_names().iter().any(|f| f == "Id"));

    // No `Id` in the request: the service only asks for declared features
    let service = InferenceService::new(DatasetDescriptor::wine(), &pipeline.store());
    let record = FeatureRecord::new()
        .with("fixed acidity", 7.3)
        .with("volatile acidity", 0.5)
        .with("citric acid", 0.25)
        .with("residual sugar", 2.0)
        .with("chlorides", 0.074)
        .with("free sulfur dioxide", 14.0)
        .with("total sulfur dioxide", 36.0)
        .with("density", 0.9964)
        .with("pH", 3.25)
        .with("sulphates", 0.6)
        .with("alcohol", 12.5);
    let prediction = service.predict(&record).unwrap();
    assert_eq!(prediction.raw_label, "8");
    assert_eq!(prediction.label, "good");
}

#[test]
fn test_retraining_bumps_bundle_version() {
    let root = tempfile::tempdir().unwrap();
    fs::create_dir_all(root.path().join("Dataset")).unwrap();
    write_water_csv(&root.path().join("Dataset"), 60);

    let pipeline = TrainingPipeline::new(config_for(root.path())).unwrap();
    let first = pipeline.run(&DatasetDescriptor::water()).unwrap();
    let second = pipeline.run(&DatasetDescriptor::water()).unwrap();

    assert_eq!(first.bundle_version, 1);
    assert_eq!(second.bundle_version, 2);
    assert!(second.split.reused);
    // Same split, seed and catalog: same winner and scores
    assert_eq!(first.selection.model_name, second.selection.model_name);
    let scores = |r: &beverage_quality::pipeline::TrainingReport| {
        r.selection
            .candidate_scores
            .iter()
            .map(|s| (s.candidate.clone(), s.mean_cv_accuracy))
            .collect::<Vec<_>>()
    };
    assert_eq!(scores(&first), scores(&second));
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = PipelineConfig::new().with_test_ratio(1.5);
    let result = TrainingPipeline::new(config);
    assert!(result.is_err());
}
