//! Integration test: catalog estimators and model selection

use beverage_quality::error::{ErrorKind, QualityError};
use beverage_quality::training::{
    AdaBoostClassifier, Candidate, Catalog, CatBoostClassifier, CatBoostConfig, ClassLabels, DecisionTree,
    Estimator, ExtraTrees, GradientBoostingClassifier, GradientBoostingConfig, KNNClassifier,
    LogisticRegression, ModelSelector, RandomForest, SVMClassifier, SelectorConfig, TrainedModel,
};
use ndarray::{Array1, Array2};

/// Three well separated clusters with a little deterministic jitter
fn three_classes(n: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rows = Vec::with_capacity(n * 3);
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let class = (i % 3) as f64;
        let jitter = ((i * 7) % 11) as f64 * 0.03;
        rows.extend_from_slice(&[class * 2.0 + jitter, 1.0 - class + jitter, 0.5 + jitter]);
        labels.push(class);
    }
    (Array2::from_shape_vec((n, 3), rows).unwrap(), Array1::from_vec(labels))
}

fn class_names() -> ClassLabels {
    ClassLabels::indexed(vec!["low".into(), "medium".into(), "high".into()])
}

fn assert_fits(mut model: TrainedModel) {
    let (x, y) = three_classes(45);
    let family = model.family();
    model.fit(&x, &y).unwrap_or_else(|e| panic!("{} failed to fit: {}", family, e));
    let predictions = model.predict_labels(&x).unwrap();
    let correct = predictions.iter().zip(y.iter()).filter(|(p, t)| p == t).count();
    assert!(correct as f64 / y.len() as f64 > 0.9, "{} accuracy {}/{}", family, correct, y.len());
}

// ============================================================================
// Estimator families
// ============================================================================

#[test]
fn test_catalog_families_fit_three_classes() {
    assert_fits(TrainedModel::LogisticRegression(LogisticRegression::new().with_max_iter(1000)));
    assert_fits(TrainedModel::DecisionTree(DecisionTree::new_classifier()));
    assert_fits(TrainedModel::RandomForest(RandomForest::new_classifier(20).with_random_state(42)));
    assert_fits(TrainedModel::ExtraTrees(ExtraTrees::new_classifier(20).with_random_state(42)));
    assert_fits(TrainedModel::GradientBoostingClassifier(GradientBoostingClassifier::new(
        GradientBoostingConfig::default(),
    )));
    assert_fits(TrainedModel::AdaBoostClassifier(AdaBoostClassifier::default()));
    assert_fits(TrainedModel::CatBoostClassifier(CatBoostClassifier::new(
        CatBoostConfig::default().with_random_state(42),
    )));
    assert_fits(TrainedModel::SVMClassifier(SVMClassifier::default()));
    assert_fits(TrainedModel::KNNClassifier(KNNClassifier::with_k(3)));
}

#[test]
fn test_probabilities_follow_classes() {
    let (x, y) = three_classes(30);
    let mut model = TrainedModel::RandomForest(RandomForest::new_classifier(10).with_random_state(7));
    model.fit(&x, &y).unwrap();

    assert_eq!(model.classes(), &[0.0, 1.0, 2.0]);
    let proba = model.predict_proba(&x).unwrap().unwrap();
    assert_eq!(proba.dim(), (30, 3));
    for row in proba.rows() {
        assert!((row.sum() - 1.0).abs() < 1e-9);
    }
}

// ============================================================================
// Selection
// ============================================================================

#[test]
fn test_standard_catalog_selection_is_deterministic() {
    let (x, y) = three_classes(60);
    let (x_test, y_test) = three_classes(15);
    let config = SelectorConfig { grid_cv_folds: 2, plain_cv_folds: 3, ..SelectorConfig::default() };

    let run = || {
        ModelSelector::new(config.clone(), Catalog::standard())
            .select(&x, &y, &x_test, &y_test, &class_names())
            .unwrap()
    };
    let first = run();
    let second = run();

    assert_eq!(first.report.model_name, second.report.model_name);
    assert_eq!(first.report.candidate_scores.len() + first.report.failures.len(), 9);
    for (a, b) in first.report.candidate_scores.iter().zip(&second.report.candidate_scores) {
        assert_eq!(a.candidate, b.candidate);
        assert_eq!(a.fold_scores, b.fold_scores);
        assert_eq!(a.best_params, b.best_params);
    }
    assert_eq!(first.report.confusion_matrix, second.report.confusion_matrix);
    assert!(first.report.test_accuracy > 0.9);
    assert!(first.report.classification_report.contains("medium"));
}

#[test]
fn test_broken_candidate_does_not_abort_selection() {
    let (x, y) = three_classes(30);
    let catalog = Catalog::new()
        .push(Candidate::new("Broken", |_params, _seed| {
            Err(QualityError::Training("cannot build".to_string()))
        }))
        .push(Candidate::new("DecisionTree", |_params, seed| {
            Ok(TrainedModel::DecisionTree(DecisionTree::new_classifier().with_random_state(seed)))
        }));

    let selection = ModelSelector::new(SelectorConfig::default(), catalog)
        .select(&x, &y, &x, &y, &class_names())
        .unwrap();
    assert_eq!(selection.report.model_name, "DecisionTree");
    assert_eq!(selection.report.failures.len(), 1);
    assert_eq!(selection.report.failures[0].candidate, "Broken");
    assert!(selection.report.failures[0].reason.contains("cannot build"));
}

#[test]
fn test_empty_catalog_has_no_viable_model() {
    let (x, y) = three_classes(30);
    let err = ModelSelector::new(SelectorConfig::default(), Catalog::new())
        .select(&x, &y, &x, &y, &class_names())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoViableModel);
}
