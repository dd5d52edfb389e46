//! Extra Trees (Extremely Randomized Trees) implementation
//!
//! Unlike Random Forest which searches for the best split among a random subset
//! of features, Extra Trees draws the threshold at random as well and fits every
//! tree on the full training set.

use crate::error::Result;
use super::decision_tree::{Criterion, SplitStrategy};
use super::models::Estimator;
use super::random_forest::{GrowSpec, MaxFeatures, TreeEnsemble};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Extra Trees classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraTrees {
    ensemble: TreeEnsemble,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub random_state: Option<u64>,
}

impl Default for ExtraTrees {
    fn default() -> Self {
        Self::new_classifier(100)
    }
}

impl ExtraTrees {
    pub fn new_classifier(n_estimators: usize) -> Self {
        Self {
            ensemble: TreeEnsemble::empty(true),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            random_state: None,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }
}

impl Estimator for ExtraTrees {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let spec = GrowSpec {
            n_estimators: self.n_estimators,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
            bootstrap: false,
            splitter: SplitStrategy::Random,
            criterion: Criterion::Gini,
            is_classification: true,
            seed: self.random_state.unwrap_or(42),
        };
        self.ensemble = TreeEnsemble::grow(&spec, x, y)?;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.ensemble.predict(x)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        self.ensemble.predict_proba(x).map(Some)
    }

    fn classes(&self) -> &[f64] {
        &self.ensemble.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QualityError;

    #[test]
    fn test_extra_trees_separates_classes() {
        let x = Array2::from_shape_vec((40, 2), (0..80).map(|i| (i / 2) as f64 + (i % 2) as f64 * 0.5).collect()).unwrap();
        let y: Array1<f64> = (0..40).map(|i| if i < 20 { 0.0 } else { 1.0 }).collect();
        let mut model = ExtraTrees::new_classifier(25).with_random_state(42);
        model.fit(&x, &y).unwrap();
        let preds = model.predict(&x).unwrap();
        let acc = preds.iter().zip(y.iter()).filter(|(p, t)| p == t).count() as f64 / 40.0;
        assert!(acc > 0.9, "Accuracy too low: {}", acc);

        let proba = model.predict_proba(&x).unwrap().unwrap();
        assert_eq!(proba.ncols(), 2);
    }

    #[test]
    fn test_unfitted_extra_trees() {
        let model = ExtraTrees::default();
        let x = Array2::zeros((1, 2));
        assert!(matches!(model.predict(&x), Err(QualityError::ModelNotFitted)));
    }
}
