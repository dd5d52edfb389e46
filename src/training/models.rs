//! Estimator trait and the persisted model enum

use crate::error::{QualityError, Result};
use super::adaboost::AdaBoostClassifier;
use super::catboost::CatBoostClassifier;
use super::decision_tree::DecisionTree;
use super::extra_trees::ExtraTrees;
use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingRegressor};
use super::knn::{KNNClassifier, KNNRegressor};
use super::linear_models::{LogisticRegression, RidgeRegression};
use super::random_forest::RandomForest;
use super::svm::SVMClassifier;
use crate::ensemble::{StackingClassifier, StackingRegressor};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Common interface of every estimator in the candidate catalog.
///
/// Classifiers are trained on class indices stored as `f64`. `predict_proba`
/// returns one column per entry of [`Estimator::classes`], in the same order.
pub trait Estimator: Send + Sync {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Predict a class index (classifiers) or a continuous value (regressors)
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Class probabilities, when the model has a probability model
    fn predict_proba(&self, _x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        Ok(None)
    }

    /// Classes seen during fitting, sorted ascending
    fn classes(&self) -> &[f64] {
        &[]
    }

    fn is_regressor(&self) -> bool {
        false
    }
}

/// A fitted model as it is persisted in an artifact bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrainedModel {
    LogisticRegression(LogisticRegression),
    RidgeRegression(RidgeRegression),
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
    ExtraTrees(ExtraTrees),
    GradientBoostingClassifier(GradientBoostingClassifier),
    GradientBoostingRegressor(GradientBoostingRegressor),
    AdaBoostClassifier(AdaBoostClassifier),
    CatBoostClassifier(CatBoostClassifier),
    SVMClassifier(SVMClassifier),
    KNNClassifier(KNNClassifier),
    KNNRegressor(KNNRegressor),
    StackingClassifier(Box<StackingClassifier>),
    StackingRegressor(Box<StackingRegressor>),
}

macro_rules! dispatch {
    ($model:expr, $m:ident => $body:expr) => {
        match $model {
            TrainedModel::LogisticRegression($m) => $body,
            TrainedModel::RidgeRegression($m) => $body,
            TrainedModel::DecisionTree($m) => $body,
            TrainedModel::RandomForest($m) => $body,
            TrainedModel::ExtraTrees($m) => $body,
            TrainedModel::GradientBoostingClassifier($m) => $body,
            TrainedModel::GradientBoostingRegressor($m) => $body,
            TrainedModel::AdaBoostClassifier($m) => $body,
            TrainedModel::CatBoostClassifier($m) => $body,
            TrainedModel::SVMClassifier($m) => $body,
            TrainedModel::KNNClassifier($m) => $body,
            TrainedModel::KNNRegressor($m) => $body,
            TrainedModel::StackingClassifier($m) => $body,
            TrainedModel::StackingRegressor($m) => $body,
        }
    };
}

impl TrainedModel {
    /// Short family name used in logs and reports
    pub fn family(&self) -> &'static str {
        match self {
            TrainedModel::LogisticRegression(_) => "LogisticRegression",
            TrainedModel::RidgeRegression(_) => "RidgeRegression",
            TrainedModel::DecisionTree(_) => "DecisionTree",
            TrainedModel::RandomForest(_) => "RandomForest",
            TrainedModel::ExtraTrees(_) => "ExtraTrees",
            TrainedModel::GradientBoostingClassifier(_) => "GradientBoostingClassifier",
            TrainedModel::GradientBoostingRegressor(_) => "GradientBoostingRegressor",
            TrainedModel::AdaBoostClassifier(_) => "AdaBoostClassifier",
            TrainedModel::CatBoostClassifier(_) => "CatBoostClassifier",
            TrainedModel::SVMClassifier(_) => "SVMClassifier",
            TrainedModel::KNNClassifier(_) => "KNNClassifier",
            TrainedModel::KNNRegressor(_) => "KNNRegressor",
            TrainedModel::StackingClassifier(_) => "StackingClassifier",
            TrainedModel::StackingRegressor(_) => "StackingRegressor",
        }
    }

    /// Predictions in label space: class indices for classifiers, rounded
    /// values for regressors.
    pub fn predict_labels(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let raw = self.predict(x)?;
        if self.is_regressor() {
            Ok(raw.mapv(f64::round))
        } else {
            Ok(raw)
        }
    }
}

impl Estimator for TrainedModel {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        dispatch!(self, m => Estimator::fit(m, x, y))
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        dispatch!(self, m => Estimator::predict(m, x))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        dispatch!(self, m => Estimator::predict_proba(m, x))
    }

    fn classes(&self) -> &[f64] {
        dispatch!(self, m => Estimator::classes(m))
    }

    fn is_regressor(&self) -> bool {
        dispatch!(self, m => Estimator::is_regressor(m))
    }
}

impl<T: Estimator + ?Sized> Estimator for Box<T> {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        (**self).fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        (**self).predict(x)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        (**self).predict_proba(x)
    }

    fn classes(&self) -> &[f64] {
        (**self).classes()
    }

    fn is_regressor(&self) -> bool {
        (**self).is_regressor()
    }
}

/// Validate that `x` and `y` have matching, non-zero sample counts
pub(crate) fn check_xy(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(QualityError::ShapeMismatch {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(QualityError::Training("cannot fit on an empty dataset".to_string()));
    }
    Ok(())
}

/// Validate the feature count of a prediction batch
pub(crate) fn check_features(x: &Array2<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(QualityError::ShapeMismatch {
            expected: format!("{} features", n_features),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}

/// Sorted distinct values of a label vector
pub(crate) fn unique_classes(y: &Array1<f64>) -> Vec<f64> {
    let mut classes: Vec<f64> = y.iter().copied().collect();
    classes.sort_by(|a, b| a.total_cmp(b));
    classes.dedup();
    classes
}

/// Position of `value` among `classes`
pub(crate) fn class_position(classes: &[f64], value: f64) -> Option<usize> {
    classes.iter().position(|&c| c == value)
}

/// Index of the largest entry; the first one wins on ties
pub(crate) fn argmax(row: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}

/// Turn a probability matrix into class predictions
pub(crate) fn proba_to_classes(proba: &Array2<f64>, classes: &[f64]) -> Array1<f64> {
    proba
        .rows()
        .into_iter()
        .map(|row| classes[argmax(row)])
        .collect()
}

/// Row-wise softmax over raw scores
pub(crate) fn softmax_rows(scores: &Array2<f64>) -> Array2<f64> {
    let mut out = scores.clone();
    for mut row in out.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum: f64 = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        }
    }
    out
}
