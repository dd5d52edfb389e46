//! Gradient Boosting implementation
//!
//! Gradient boosted regression trees. The classifier fits one tree per class
//! and round on the softmax residuals; the regressor fits squared-error
//! residuals.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::decision_tree::DecisionTree;
use super::models::{check_xy, class_position, proba_to_classes, softmax_rows, unique_classes, Estimator};
use crate::error::{QualityError, Result};

/// Gradient Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum samples per leaf
    pub min_samples_leaf: usize,
    /// Subsample ratio of rows for each round
    pub subsample: f64,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 1.0,
            random_state: Some(42),
        }
    }
}

impl GradientBoostingConfig {
    fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 || self.learning_rate <= 0.0 {
            return Err(QualityError::InvalidConfig(format!(
                "gradient boosting needs n_estimators >= 1 and learning_rate > 0, got {} and {}",
                self.n_estimators, self.learning_rate
            )));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(QualityError::InvalidConfig(format!(
                "subsample must be in (0, 1], got {}",
                self.subsample
            )));
        }
        Ok(())
    }

    fn rng(&self) -> Xoshiro256PlusPlus {
        Xoshiro256PlusPlus::seed_from_u64(self.random_state.unwrap_or(42))
    }

    fn subsample_indices(&self, n: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        if self.subsample < 1.0 {
            let sample_size = ((n as f64) * self.subsample).ceil() as usize;
            indices.shuffle(rng);
            indices.truncate(sample_size.max(1));
            indices.sort_unstable();
        }
        indices
    }

    fn residual_tree(&self, x: &Array2<f64>, residuals: &Array1<f64>, rows: &[usize]) -> Result<DecisionTree> {
        let x_sub = x.select(Axis(0), rows);
        let r_sub: Array1<f64> = rows.iter().map(|&i| residuals[i]).collect();
        let mut tree = DecisionTree::new_regressor()
            .with_max_depth(self.max_depth)
            .with_min_samples_leaf(self.min_samples_leaf);
        tree.fit(&x_sub, &r_sub)?;
        Ok(tree)
    }
}

/// Gradient Boosting Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    config: GradientBoostingConfig,
    trees: Vec<DecisionTree>,
    initial_prediction: f64,
}

impl GradientBoostingRegressor {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            initial_prediction: 0.0,
        }
    }
}

impl Estimator for GradientBoostingRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.config.validate()?;
        let n_samples = x.nrows();
        self.initial_prediction = y.mean().unwrap_or(0.0);
        let mut predictions = Array1::from_elem(n_samples, self.initial_prediction);
        let mut rng = self.config.rng();

        self.trees.clear();
        for _ in 0..self.config.n_estimators {
            let residuals = y - &predictions;
            let rows = self.config.subsample_indices(n_samples, &mut rng);
            let tree = self.config.residual_tree(x, &residuals, &rows)?;
            predictions.scaled_add(self.config.learning_rate, &tree.predict(x)?);
            self.trees.push(tree);
        }
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(QualityError::ModelNotFitted);
        }
        let mut predictions = Array1::from_elem(x.nrows(), self.initial_prediction);
        for tree in &self.trees {
            predictions.scaled_add(self.config.learning_rate, &tree.predict(x)?);
        }
        Ok(predictions)
    }

    fn is_regressor(&self) -> bool {
        true
    }
}

/// Gradient Boosting Classifier (multinomial deviance)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    config: GradientBoostingConfig,
    /// `rounds[r][k]` is the tree for class `k` in round `r`
    rounds: Vec<Vec<DecisionTree>>,
    initial_scores: Vec<f64>,
    classes: Vec<f64>,
}

impl GradientBoostingClassifier {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            rounds: Vec::new(),
            initial_scores: Vec::new(),
            classes: Vec::new(),
        }
    }

    fn raw_scores(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let n_classes = self.classes.len();
        let mut scores = Array2::zeros((x.nrows(), n_classes));
        for (k, &init) in self.initial_scores.iter().enumerate() {
            scores.column_mut(k).fill(init);
        }
        for round in &self.rounds {
            for (k, tree) in round.iter().enumerate() {
                let mut column = scores.column_mut(k);
                column.scaled_add(self.config.learning_rate, &tree.predict(x)?);
            }
        }
        Ok(scores)
    }
}

impl Estimator for GradientBoostingClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.config.validate()?;
        self.classes = unique_classes(y);
        let n_classes = self.classes.len();
        if n_classes < 2 {
            return Err(QualityError::Training(
                "gradient boosting needs at least two classes".to_string(),
            ));
        }
        let n_samples = x.nrows();

        let mut onehot = Array2::<f64>::zeros((n_samples, n_classes));
        for (i, &label) in y.iter().enumerate() {
            if let Some(k) = class_position(&self.classes, label) {
                onehot[[i, k]] = 1.0;
            }
        }

        // Log class priors as the starting scores
        self.initial_scores = (0..n_classes)
            .map(|k| {
                let prior = onehot.column(k).sum() / n_samples as f64;
                prior.max(1e-12).ln()
            })
            .collect();

        let mut scores = Array2::zeros((n_samples, n_classes));
        for (k, &init) in self.initial_scores.iter().enumerate() {
            scores.column_mut(k).fill(init);
        }

        let mut rng = self.config.rng();
        self.rounds.clear();
        for _ in 0..self.config.n_estimators {
            let proba = softmax_rows(&scores);
            let rows = self.config.subsample_indices(n_samples, &mut rng);
            let mut round = Vec::with_capacity(n_classes);
            for k in 0..n_classes {
                let residuals = &onehot.column(k) - &proba.column(k);
                let tree = self.config.residual_tree(x, &residuals, &rows)?;
                let mut column = scores.column_mut(k);
                column.scaled_add(self.config.learning_rate, &tree.predict(x)?);
                round.push(tree);
            }
            self.rounds.push(round);
        }
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?.ok_or(QualityError::ModelNotFitted)?;
        Ok(proba_to_classes(&proba, &self.classes))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        if self.rounds.is_empty() {
            return Err(QualityError::ModelNotFitted);
        }
        Ok(Some(softmax_rows(&self.raw_scores(x)?)))
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_vec((90, 2), (0..180).map(|i| ((i * 7) % 90) as f64 / 10.0).collect()).unwrap();
        let y: Array1<f64> = x.column(0).iter().map(|&v| if v < 3.0 { 0.0 } else if v < 6.0 { 1.0 } else { 2.0 }).collect();
        (x, y)
    }

    #[test]
    fn test_gradient_boosting_multiclass() {
        let (x, y) = make_classification_data();
        let config = GradientBoostingConfig { n_estimators: 30, ..Default::default() };
        let mut model = GradientBoostingClassifier::new(config);
        model.fit(&x, &y).unwrap();
        let preds = model.predict(&x).unwrap();
        let acc = preds.iter().zip(y.iter()).filter(|(p, t)| p == t).count() as f64 / 90.0;
        assert!(acc > 0.95, "Accuracy too low: {}", acc);

        let proba = model.predict_proba(&x).unwrap().unwrap();
        assert_eq!(proba.ncols(), 3);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_gradient_boosting_regressor() {
        let x = Array2::from_shape_vec((50, 1), (0..50).map(|i| i as f64).collect()).unwrap();
        let y: Array1<f64> = (0..50).map(|i| 2.0 * i as f64 + 1.0).collect();
        let config = GradientBoostingConfig { n_estimators: 50, ..Default::default() };
        let mut model = GradientBoostingRegressor::new(config);
        model.fit(&x, &y).unwrap();
        let preds = model.predict(&x).unwrap();
        let mse = (&preds - &y).mapv(|v| v * v).mean().unwrap();
        assert!(mse < 5.0, "MSE too high: {}", mse);
    }

    #[test]
    fn test_single_class_is_rejected() {
        let x = Array2::zeros((4, 1));
        let y = Array1::zeros(4);
        let mut model = GradientBoostingClassifier::new(GradientBoostingConfig::default());
        assert!(model.fit(&x, &y).is_err());
    }
}
