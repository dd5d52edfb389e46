//! Stacking ensemble method
//!
//! Base models produce out-of-fold predictions that become the training
//! features of a meta-learner; the base models are then refit on the full
//! training set for inference.

use crate::error::{QualityError, Result};
use crate::training::cross_validation::{CVSplit, CrossValidator};
use crate::training::linear_models::{LogisticRegression, RidgeRegression};
use crate::training::models::{check_xy, class_position, proba_to_classes, unique_classes, Estimator, TrainedModel};
use ndarray::{s, Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration for stacking ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackingConfig {
    /// Number of cross-validation folds for the out-of-fold predictions
    pub n_folds: usize,
    /// Whether to include original features in meta-learner input
    pub passthrough: bool,
}

impl Default for StackingConfig {
    fn default() -> Self {
        Self {
            n_folds: 5,
            passthrough: false,
        }
    }
}

fn check_config(config: &StackingConfig, bases: &[TrainedModel]) -> Result<()> {
    if bases.is_empty() {
        return Err(QualityError::InvalidConfig("No base models provided".to_string()));
    }
    if config.n_folds < 2 {
        return Err(QualityError::InvalidConfig("stacking needs at least 2 folds".to_string()));
    }
    Ok(())
}

/// Copy the original features after the meta-features when passthrough is on
fn with_passthrough(config: &StackingConfig, meta: Array2<f64>, x: &Array2<f64>) -> Result<Array2<f64>> {
    if !config.passthrough {
        return Ok(meta);
    }
    Ok(ndarray::concatenate(Axis(1), &[meta.view(), x.view()])?)
}

/// Fit a copy of `template` on each training fold and hand every
/// validation fold's predictions to `sink`
fn out_of_fold<F>(template: &TrainedModel, x: &Array2<f64>, y: &Array1<f64>, splits: &[CVSplit], mut sink: F) -> Result<()>
where
    F: FnMut(&[usize], &TrainedModel, &Array2<f64>) -> Result<()>,
{
    for split in splits {
        let x_train = x.select(Axis(0), &split.train_indices);
        let y_train = y.select(Axis(0), &split.train_indices);
        let mut model = template.clone();
        model.fit(&x_train, &y_train)?;
        let x_val = x.select(Axis(0), &split.test_indices);
        sink(&split.test_indices, &model, &x_val)?;
    }
    Ok(())
}

/// Class probabilities of `model` aligned to `classes`; models without a
/// probability model contribute a one-hot vote
fn aligned_proba(model: &TrainedModel, x: &Array2<f64>, classes: &[f64]) -> Result<Array2<f64>> {
    let mut out = Array2::zeros((x.nrows(), classes.len()));
    match model.predict_proba(x)? {
        Some(proba) => {
            for (col, &class) in model.classes().iter().enumerate() {
                if let Some(k) = class_position(classes, class) {
                    out.column_mut(k).assign(&proba.column(col));
                }
            }
        }
        None => {
            for (i, label) in model.predict(x)?.iter().enumerate() {
                if let Some(k) = class_position(classes, *label) {
                    out[[i, k]] = 1.0;
                }
            }
        }
    }
    Ok(out)
}

/// Stacking classifier with a logistic-regression meta-learner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackingClassifier {
    config: StackingConfig,
    base_models: Vec<TrainedModel>,
    meta_learner: LogisticRegression,
    classes: Vec<f64>,
    fitted: bool,
}

impl StackingClassifier {
    /// Create a new stacking classifier
    pub fn new(config: StackingConfig) -> Self {
        Self {
            config,
            base_models: Vec::new(),
            meta_learner: LogisticRegression::new(),
            classes: Vec::new(),
            fitted: false,
        }
    }

    /// Add a base model
    pub fn add_base_model(mut self, model: TrainedModel) -> Self {
        self.base_models.push(model);
        self
    }

    /// Set the meta-learner
    pub fn with_meta_learner(mut self, meta_learner: LogisticRegression) -> Self {
        self.meta_learner = meta_learner;
        self
    }

    pub fn base_families(&self) -> Vec<&'static str> {
        self.base_models.iter().map(TrainedModel::family).collect()
    }

    fn meta_features(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let k = self.classes.len();
        let blocks: Vec<Array2<f64>> = self
            .base_models
            .par_iter()
            .map(|model| aligned_proba(model, x, &self.classes))
            .collect::<Result<Vec<_>>>()?;
        let mut meta = Array2::zeros((x.nrows(), k * blocks.len()));
        for (b, block) in blocks.iter().enumerate() {
            meta.slice_mut(s![.., b * k..(b + 1) * k]).assign(block);
        }
        with_passthrough(&self.config, meta, x)
    }
}

impl Estimator for StackingClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        check_config(&self.config, &self.base_models)?;
        self.classes = unique_classes(y);
        let k = self.classes.len();
        let splits = CrossValidator::for_task(self.config.n_folds, false).split(y)?;
        let classes = &self.classes;

        // Out-of-fold probabilities per base model, then a full refit
        let results: Vec<(Array2<f64>, TrainedModel)> = self
            .base_models
            .par_iter()
            .map(|template| -> Result<(Array2<f64>, TrainedModel)> {
                let mut block = Array2::zeros((x.nrows(), k));
                out_of_fold(template, x, y, &splits, |rows, model, x_val| {
                    let proba = aligned_proba(model, x_val, classes)?;
                    for (local, &global) in rows.iter().enumerate() {
                        block.row_mut(global).assign(&proba.row(local));
                    }
                    Ok(())
                })?;
                let mut full = template.clone();
                full.fit(x, y)?;
                Ok((block, full))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut meta = Array2::zeros((x.nrows(), k * results.len()));
        let mut fitted = Vec::with_capacity(results.len());
        for (b, (block, model)) in results.into_iter().enumerate() {
            meta.slice_mut(s![.., b * k..(b + 1) * k]).assign(&block);
            fitted.push(model);
        }
        let meta = with_passthrough(&self.config, meta, x)?;
        self.meta_learner.fit(&meta, y)?;
        self.base_models = fitted;
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?.ok_or(QualityError::ModelNotFitted)?;
        Ok(proba_to_classes(&proba, &self.classes))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        if !self.fitted {
            return Err(QualityError::ModelNotFitted);
        }
        let meta = self.meta_features(x)?;
        // The meta-learner only knows the classes it saw; realign to ours
        let raw = self.meta_learner.predict_proba(&meta)?;
        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for (col, &class) in Estimator::classes(&self.meta_learner).iter().enumerate() {
            if let Some(k) = class_position(&self.classes, class) {
                proba.column_mut(k).assign(&raw.column(col));
            }
        }
        Ok(Some(proba))
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}

/// Stacking regressor with a ridge meta-learner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackingRegressor {
    config: StackingConfig,
    base_models: Vec<TrainedModel>,
    meta_learner: RidgeRegression,
    fitted: bool,
}

impl StackingRegressor {
    /// Create a new stacking regressor
    pub fn new(config: StackingConfig) -> Self {
        Self {
            config,
            base_models: Vec::new(),
            meta_learner: RidgeRegression::new(1.0),
            fitted: false,
        }
    }

    /// Add a base model
    pub fn add_base_model(mut self, model: TrainedModel) -> Self {
        self.base_models.push(model);
        self
    }

    /// Set the meta-learner
    pub fn with_meta_learner(mut self, meta_learner: RidgeRegression) -> Self {
        self.meta_learner = meta_learner;
        self
    }
}

impl Estimator for StackingRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        check_config(&self.config, &self.base_models)?;
        let splits = CrossValidator::for_task(self.config.n_folds, true).split(y)?;

        let results: Vec<(Array1<f64>, TrainedModel)> = self
            .base_models
            .par_iter()
            .map(|template| -> Result<(Array1<f64>, TrainedModel)> {
                let mut column = Array1::zeros(x.nrows());
                out_of_fold(template, x, y, &splits, |rows, model, x_val| {
                    let predictions = model.predict(x_val)?;
                    for (local, &global) in rows.iter().enumerate() {
                        column[global] = predictions[local];
                    }
                    Ok(())
                })?;
                let mut full = template.clone();
                full.fit(x, y)?;
                Ok((column, full))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut meta = Array2::zeros((x.nrows(), results.len()));
        let mut fitted = Vec::with_capacity(results.len());
        for (b, (column, model)) in results.into_iter().enumerate() {
            meta.column_mut(b).assign(&column);
            fitted.push(model);
        }
        let meta = with_passthrough(&self.config, meta, x)?;
        self.meta_learner.fit(&meta, y)?;
        self.base_models = fitted;
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.fitted {
            return Err(QualityError::ModelNotFitted);
        }
        let columns: Vec<Array1<f64>> = self
            .base_models
            .par_iter()
            .map(|model| model.predict(x))
            .collect::<Result<Vec<_>>>()?;
        let mut meta = Array2::zeros((x.nrows(), columns.len()));
        for (b, column) in columns.iter().enumerate() {
            meta.column_mut(b).assign(column);
        }
        let meta = with_passthrough(&self.config, meta, x)?;
        self.meta_learner.predict(&meta)
    }

    fn is_regressor(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::decision_tree::DecisionTree;
    use crate::training::knn::{KNNClassifier, KNNRegressor};
    use crate::training::svm::SVMClassifier;

    fn three_blobs() -> (Array2<f64>, Array1<f64>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..45 {
            let class = (i % 3) as f64;
            let jitter = ((i * 7) % 5) as f64 * 0.1;
            rows.extend_from_slice(&[class * 4.0 + jitter, class * -2.0 + jitter]);
            labels.push(class);
        }
        (Array2::from_shape_vec((45, 2), rows).unwrap(), Array1::from_vec(labels))
    }

    #[test]
    fn test_stacking_config_default() {
        let config = StackingConfig::default();
        assert_eq!(config.n_folds, 5);
        assert!(!config.passthrough);
    }

    #[test]
    fn test_stacking_classifier() {
        let (x, y) = three_blobs();
        let mut model = StackingClassifier::new(StackingConfig { n_folds: 3, ..Default::default() })
            .add_base_model(TrainedModel::DecisionTree(DecisionTree::new_classifier().with_max_depth(3)))
            .add_base_model(TrainedModel::KNNClassifier(KNNClassifier::with_k(3)))
            .add_base_model(TrainedModel::SVMClassifier(SVMClassifier::default()));
        model.fit(&x, &y).unwrap();
        assert_eq!(model.base_families(), vec!["DecisionTree", "KNNClassifier", "SVMClassifier"]);

        let preds = model.predict(&x).unwrap();
        let acc = preds.iter().zip(y.iter()).filter(|(p, t)| p == t).count() as f64 / 45.0;
        assert!(acc > 0.9, "Accuracy too low: {}", acc);

        let proba = model.predict_proba(&x).unwrap().unwrap();
        assert_eq!(proba.ncols(), 3);
    }

    #[test]
    fn test_stacking_regressor() {
        let x = Array2::from_shape_vec((30, 1), (0..30).map(|i| (i % 3) as f64 + (i / 3) as f64 * 0.01).collect()).unwrap();
        let y: Array1<f64> = (0..30).map(|i| 3.0 + (i % 3) as f64).collect();
        let mut model = StackingRegressor::new(StackingConfig { n_folds: 3, ..Default::default() })
            .add_base_model(TrainedModel::DecisionTree(DecisionTree::new_regressor().with_max_depth(3)))
            .add_base_model(TrainedModel::KNNRegressor(KNNRegressor::with_k(3)));
        model.fit(&x, &y).unwrap();
        let preds = model.predict(&x).unwrap();
        let mse = (&preds - &y).mapv(|v| v * v).mean().unwrap();
        assert!(mse < 0.5, "MSE too high: {}", mse);
        assert!(model.is_regressor());
    }

    #[test]
    fn test_stacking_without_bases() {
        let (x, y) = three_blobs();
        let mut model = StackingClassifier::new(StackingConfig::default());
        assert!(matches!(model.fit(&x, &y), Err(QualityError::InvalidConfig(_))));
    }
}
