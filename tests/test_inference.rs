//! Integration tests for the inference service over persisted bundles

use beverage_quality::artifacts::ArtifactStore;
use beverage_quality::dataset::{DatasetDescriptor, DatasetId};
use beverage_quality::error::{ErrorKind, QualityError};
use beverage_quality::inference::{InferenceService, ServiceStatus, REGRESSION_CONFIDENCE};
use beverage_quality::preprocessing::{FeaturePipeline, FeatureRecord, LabelEncoder, StandardScaler};
use beverage_quality::training::{DecisionTree, Estimator, LogisticRegression, RidgeRegression, TrainedModel};
use ndarray::{Array1, Array2};

// ============================================================================
// Fixtures
// ============================================================================

/// Milk pipeline with identity scaling over the 35 expanded columns
fn milk_pipeline() -> FeaturePipeline {
    let descriptor = DatasetDescriptor::milk();
    let scaler = StandardScaler::from_parameters(Array1::zeros(35), Array1::ones(35)).unwrap();
    FeaturePipeline::from_parameters(
        descriptor.features().to_vec(),
        true,
        vec![6.6, 41.0, 255.0, 1.0, 0.0, 1.0, 0.0],
        scaler,
    )
    .unwrap()
}

/// Fixed-coefficient model: `Taste` alone drives the `high` score
fn milk_model() -> TrainedModel {
    let mut coefficients = Array2::zeros((3, 35));
    coefficients[[0, 3]] = 1.0;
    let intercept = Array1::from_vec(vec![0.0, 0.5, 0.0]);
    TrainedModel::LogisticRegression(
        LogisticRegression::from_parameters(vec![0.0, 1.0, 2.0], coefficients, intercept).unwrap(),
    )
}

/// The reference milk sample with a chosen `Taste`
fn milk_record(taste: f64) -> FeatureRecord {
    FeatureRecord::new()
        .with("pH", 6.8)
        .with("Temprature", 4.0)
        .with("Colour", 252.0)
        .with("Taste", taste)
        .with("Odor", 0.0)
        .with("Fat", 1.0)
        .with("Turbidity", 0.0)
}

fn save_milk_bundle(store: &ArtifactStore) {
    let encoder = LabelEncoder::from_classes(vec!["high".into(), "medium".into(), "low".into()]).unwrap();
    store
        .save_bundle(DatasetId::Milk, &milk_pipeline(), &encoder, &milk_model())
        .unwrap();
}

/// Wine features where only `alcohol` varies, set to the quality score
fn wine_matrix(qualities: &[f64]) -> Array2<f64> {
    let n_features = DatasetDescriptor::wine().n_features();
    let mut x = Array2::ones((qualities.len(), n_features));
    for (i, q) in qualities.iter().enumerate() {
        x[[i, n_features - 1]] = *q;
    }
    x
}

fn wine_record(alcohol: f64) -> FeatureRecord {
    let mut record = FeatureRecord::new();
    for name in DatasetDescriptor::wine().features() {
        record.insert(name.clone(), 1.0);
    }
    record.insert("alcohol", alcohol);
    record
}

// ============================================================================
// Milk golden scenario
// ============================================================================

#[test]
fn test_milk_golden_prediction() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    save_milk_bundle(&store);

    let service = InferenceService::new(DatasetDescriptor::milk(), &store);
    assert_eq!(service.status(), ServiceStatus::Ready);
    assert_eq!(service.bundle_version(), Some(1));

    let prediction = service.predict(&milk_record(1.0)).unwrap();
    assert_eq!(prediction.label, "high");
    assert_eq!(prediction.raw_label, "high");
    let confidence = prediction.confidence.unwrap();
    // softmax of [1.0, 0.5, 0.0]
    let expected = 1f64.exp() / (1f64.exp() + 0.5f64.exp() + 1.0);
    assert!((confidence - expected).abs() < 1e-9, "confidence {}", confidence);

    let prediction = service.predict(&milk_record(0.0)).unwrap();
    assert_eq!(prediction.label, "medium");
}

#[test]
fn test_transform_is_deterministic_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    save_milk_bundle(&store);

    let original = milk_pipeline();
    let loaded = store.load_bundle(DatasetId::Milk).unwrap().pipeline;
    let record = milk_record(1.0);

    let before = original.transform_record(&record).unwrap();
    let first = loaded.transform_record(&record).unwrap();
    let second = loaded.transform_record(&record).unwrap();
    assert_eq!(before, first);
    assert_eq!(first, second);
    assert_eq!(loaded.output_feature_names().len(), 35);
}

// ============================================================================
// Schema enforcement
// ============================================================================

#[test]
fn test_missing_feature_is_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    save_milk_bundle(&store);
    let service = InferenceService::new(DatasetDescriptor::milk(), &store);

    let mut record = FeatureRecord::new();
    for (name, value) in [("pH", 6.6), ("Temprature", 35.0), ("Colour", 254.0)] {
        record.insert(name, value);
    }
    let err = service.predict(&record).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Prediction);
    assert!(matches!(err.root(), QualityError::Schema(m) if m.contains("Taste")));
}

#[test]
fn test_extra_feature_is_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    save_milk_bundle(&store);
    let service = InferenceService::new(DatasetDescriptor::milk(), &store);

    let record = milk_record(1.0).with("Grade", 1.0);
    let err = service.predict(&record).unwrap_err();
    assert!(matches!(err.root(), QualityError::Schema(m) if m.contains("unexpected features: Grade")));
}

#[test]
fn test_uninitialized_service_never_loads_again() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    let service = InferenceService::new(DatasetDescriptor::milk(), &store);
    assert_eq!(service.status(), ServiceStatus::Uninitialized);

    // A bundle written afterwards is not picked up
    save_milk_bundle(&store);
    let err = service.predict(&milk_record(1.0)).unwrap_err();
    assert_eq!(err.root().kind(), ErrorKind::ArtifactLoad);
}

// ============================================================================
// Wine banding
// ============================================================================

#[test]
fn test_wine_classification_bands() {
    let qualities = [4.0, 5.0, 6.0, 7.0, 8.0, 4.0, 5.0, 6.0, 7.0, 8.0];
    let x = wine_matrix(&qualities);
    let mut pipeline = FeaturePipeline::for_dataset(&DatasetDescriptor::wine());
    let xt = pipeline.fit_matrix(&x).unwrap();

    let raw: Vec<String> = qualities.iter().map(|q| format!("{}", *q as i64)).collect();
    let mut encoder = LabelEncoder::new();
    encoder.fit(raw.as_slice()).unwrap();
    let y = encoder.encode_all(raw.as_slice()).unwrap();

    let mut model = TrainedModel::DecisionTree(DecisionTree::new_classifier());
    model.fit(&xt, &y).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    store.save_bundle(DatasetId::Wine, &pipeline, &encoder, &model).unwrap();
    let service = InferenceService::new(DatasetDescriptor::wine(), &store);

    for (quality, band) in [(8.0, "good"), (4.0, "bad"), (6.0, "average"), (5.0, "average"), (7.0, "average")] {
        let prediction = service.predict(&wine_record(quality)).unwrap();
        assert_eq!(prediction.label, band, "quality {}", quality);
        assert_eq!(prediction.raw_label, format!("{}", quality as i64));
    }
}

#[test]
fn test_wine_regression_rounds_then_bands() {
    let qualities: Vec<f64> = (0..60).map(|i| 3.0 + (i % 7) as f64).collect();
    let x = wine_matrix(&qualities);
    let mut pipeline = FeaturePipeline::for_dataset(&DatasetDescriptor::wine());
    let xt = pipeline.fit_matrix(&x).unwrap();

    let raw: Vec<String> = qualities.iter().map(|q| format!("{}", *q as i64)).collect();
    let mut encoder = LabelEncoder::new();
    encoder.fit(raw.as_slice()).unwrap();

    let mut model = TrainedModel::RidgeRegression(RidgeRegression::new(1.0));
    model.fit(&xt, &Array1::from_vec(qualities.clone())).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    store.save_bundle(DatasetId::Wine, &pipeline, &encoder, &model).unwrap();
    let service = InferenceService::new(DatasetDescriptor::wine(), &store);

    let good = service.predict(&wine_record(8.0)).unwrap();
    assert_eq!(good.raw_label, "8");
    assert_eq!(good.label, "good");
    assert_eq!(good.confidence, Some(REGRESSION_CONFIDENCE));

    assert_eq!(service.predict(&wine_record(4.0)).unwrap().label, "bad");
    assert_eq!(service.predict(&wine_record(6.0)).unwrap().label, "average");
}

// ============================================================================
// Label round trip
// ============================================================================

#[test]
fn test_label_round_trip_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    save_milk_bundle(&store);
    let encoder = store.load_bundle(DatasetId::Milk).unwrap().encoder;

    for label in ["high", "medium", "low"] {
        let idx = encoder.encode(label).unwrap();
        assert_eq!(encoder.decode(idx).unwrap(), label);
    }
    assert!(encoder.encode("excellent").is_err());
    assert!(encoder.decode(3).is_err());
}

#[test]
fn test_concurrent_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    save_milk_bundle(&store);
    let service = std::sync::Arc::new(InferenceService::new(DatasetDescriptor::milk(), &store));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let service = std::sync::Arc::clone(&service);
            std::thread::spawn(move || {
                let taste = (i % 2) as f64;
                service.predict(&milk_record(taste)).unwrap().label
            })
        })
        .collect();
    let labels: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(labels, vec!["medium", "high", "medium", "high"]);
}
