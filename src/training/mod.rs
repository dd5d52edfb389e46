//! Model training module
//!
//! Provides the estimator families of the candidate catalog:
//! - Logistic regression (and ridge regression for regression stacks)
//! - Decision trees, random forests and extra-trees
//! - Gradient boosting, AdaBoost and symmetric-tree (CatBoost-style) boosting
//! - Support vector machines
//! - K-nearest neighbours
//!
//! plus cross-validation, hyperparameter grids, held-out metrics and the
//! selector that ties them together.

pub(crate) mod models;
pub mod adaboost;
pub mod catalog;
pub mod catboost;
pub mod cross_validation;
pub mod decision_tree;
pub mod extra_trees;
pub mod gradient_boosting;
pub mod grid_search;
pub mod knn;
pub mod linear_models;
pub mod metrics;
pub mod random_forest;
pub mod selector;
pub mod svm;

pub use adaboost::AdaBoostClassifier;
pub use catalog::{stacking_classifier, stacking_regressor, Candidate, Catalog, CatalogVariant, ModelFactory};
pub use catboost::{CatBoostClassifier, CatBoostConfig};
pub use cross_validation::{CVResults, CVSplit, CVStrategy, CrossValidator};
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use extra_trees::ExtraTrees;
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig, GradientBoostingRegressor};
pub use grid_search::{HyperParams, ParamGrid, ParamValue};
pub use knn::{DistanceMetric, KNNClassifier, KNNConfig, KNNRegressor, WeightScheme};
pub use linear_models::{LogisticRegression, RidgeRegression};
pub use metrics::{accuracy_score, confusion_matrix, label_axis, ClassScores, ClassificationReport, HeldOutMetrics};
pub use models::{Estimator, TrainedModel};
pub use random_forest::{MaxFeatures, RandomForest};
pub use selector::{
    BestOfN, CandidateScore, ClassLabels, ModelSelector, Selection, SelectionReport, SelectorConfig,
};
pub use svm::{KernelType, SVMClassifier, SVMConfig};
