//! Random Forest implementation

use crate::error::{QualityError, Result};
use super::decision_tree::{Criterion, DecisionTree, SplitStrategy};
use super::models::{check_xy, class_position, unique_classes, Estimator};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Strategy for max features
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum MaxFeatures {
    /// Square root of n_features
    Sqrt,
    /// Log2 of n_features
    Log2,
    /// Fraction of n_features
    Fraction(f64),
    /// Fixed number
    Fixed(usize),
    /// All features
    All,
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        match *self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => n.min(n_features),
            MaxFeatures::All => n_features,
        }
        .clamp(1, n_features.max(1))
    }
}

/// Bagged ensemble of decision trees shared by random forests and extra-trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TreeEnsemble {
    pub(crate) trees: Vec<DecisionTree>,
    pub(crate) classes: Vec<f64>,
    pub(crate) is_classification: bool,
}

/// Per-tree settings handed to [`TreeEnsemble::grow`]
pub(crate) struct GrowSpec {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub splitter: SplitStrategy,
    pub criterion: Criterion,
    pub is_classification: bool,
    pub seed: u64,
}

impl TreeEnsemble {
    pub(crate) fn empty(is_classification: bool) -> Self {
        Self { trees: Vec::new(), classes: Vec::new(), is_classification }
    }

    /// Grow `n_estimators` trees in parallel; tree `i` is seeded with `seed + i`
    pub(crate) fn grow(spec: &GrowSpec, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        check_xy(x, y)?;
        if spec.n_estimators == 0 {
            return Err(QualityError::InvalidConfig("n_estimators must be at least 1".to_string()));
        }
        let n_samples = x.nrows();
        let max_features = spec.max_features.resolve(x.ncols());

        let trees: Vec<DecisionTree> = (0..spec.n_estimators)
            .into_par_iter()
            .map(|tree_idx| -> Result<DecisionTree> {
                let seed = spec.seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let mut tree = if spec.is_classification {
                    DecisionTree::new_classifier()
                } else {
                    DecisionTree::new_regressor()
                }
                .with_min_samples_split(spec.min_samples_split)
                .with_min_samples_leaf(spec.min_samples_leaf)
                .with_criterion(spec.criterion)
                .with_splitter(spec.splitter)
                .with_max_features(max_features)
                .with_random_state(seed);
                if let Some(d) = spec.max_depth {
                    tree = tree.with_max_depth(d);
                }

                if spec.bootstrap {
                    let sample_indices: Vec<usize> =
                        (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                    let x_boot = x.select(Axis(0), &sample_indices);
                    let y_boot: Array1<f64> = sample_indices.iter().map(|&i| y[i]).collect();
                    tree.fit(&x_boot, &y_boot)?;
                } else {
                    tree.fit(x, y)?;
                }
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        let classes = if spec.is_classification { unique_classes(y) } else { Vec::new() };
        Ok(Self { trees, classes, is_classification: spec.is_classification })
    }

    /// Average of the per-tree class distributions, aligned to the ensemble classes
    pub(crate) fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(QualityError::ModelNotFitted);
        }
        let per_tree: Vec<Array2<f64>> = self
            .trees
            .par_iter()
            .map(|tree| tree.predict_proba(x))
            .collect::<Result<Vec<_>>>()?;

        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for (tree, tree_proba) in self.trees.iter().zip(per_tree.iter()) {
            for (col, &class) in Estimator::classes(tree).iter().enumerate() {
                if let Some(k) = class_position(&self.classes, class) {
                    let mut target = proba.column_mut(k);
                    target += &tree_proba.column(col);
                }
            }
        }
        proba /= self.trees.len() as f64;
        Ok(proba)
    }

    pub(crate) fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(QualityError::ModelNotFitted);
        }
        if self.is_classification {
            let proba = self.predict_proba(x)?;
            Ok(super::models::proba_to_classes(&proba, &self.classes))
        } else {
            let per_tree: Vec<Array1<f64>> = self
                .trees
                .par_iter()
                .map(|tree| tree.predict(x))
                .collect::<Result<Vec<_>>>()?;
            let mut sum = Array1::zeros(x.nrows());
            for p in &per_tree {
                sum += p;
            }
            Ok(sum / per_tree.len() as f64)
        }
    }
}

/// Random Forest model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    ensemble: TreeEnsemble,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Maximum features per split (sqrt by default)
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub criterion: Criterion,
    pub random_state: Option<u64>,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new_classifier(100)
    }
}

impl RandomForest {
    /// Create a new classifier forest
    pub fn new_classifier(n_estimators: usize) -> Self {
        Self {
            ensemble: TreeEnsemble::empty(true),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            criterion: Criterion::Gini,
            random_state: None,
        }
    }

    /// Create a new regressor forest
    pub fn new_regressor(n_estimators: usize) -> Self {
        Self {
            ensemble: TreeEnsemble::empty(false),
            criterion: Criterion::MSE,
            max_features: MaxFeatures::All,
            ..Self::new_classifier(n_estimators)
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    /// Set max features strategy
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn n_trees(&self) -> usize {
        self.ensemble.trees.len()
    }

    /// Fit the forest to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let spec = GrowSpec {
            n_estimators: self.n_estimators,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
            bootstrap: self.bootstrap,
            splitter: SplitStrategy::Best,
            criterion: self.criterion,
            is_classification: self.ensemble.is_classification,
            seed: self.random_state.unwrap_or(42),
        };
        self.ensemble = TreeEnsemble::grow(&spec, x, y)?;
        Ok(self)
    }
}

impl Estimator for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        RandomForest::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.ensemble.predict(x)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        if self.ensemble.is_classification {
            self.ensemble.predict_proba(x).map(Some)
        } else {
            Ok(None)
        }
    }

    fn classes(&self) -> &[f64] {
        &self.ensemble.classes
    }

    fn is_regressor(&self) -> bool {
        !self.ensemble.is_classification
    }
}
