//! Candidate catalog
//!
//! The fixed, ordered list of estimator families the selector attempts,
//! each with an optional hyperparameter grid and a factory that builds an
//! unfitted model from a parameter assignment and a seed.

use super::adaboost::AdaBoostClassifier;
use super::catboost::{CatBoostClassifier, CatBoostConfig};
use super::decision_tree::DecisionTree;
use super::extra_trees::ExtraTrees;
use super::gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig, GradientBoostingRegressor};
use super::grid_search::{param_f64, param_opt_usize, param_usize, HyperParams, ParamGrid, ParamValue};
use super::knn::{KNNClassifier, KNNRegressor};
use super::linear_models::LogisticRegression;
use super::models::TrainedModel;
use super::random_forest::RandomForest;
use super::svm::SVMClassifier;
use crate::ensemble::{StackingClassifier, StackingConfig, StackingRegressor};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Builds an unfitted model from a parameter assignment and a seed
pub type ModelFactory = Arc<dyn Fn(&HyperParams, u64) -> Result<TrainedModel> + Send + Sync>;

/// Which candidate list a dataset searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogVariant {
    Standard,
    /// The standard list followed by a stacking ensemble
    WithStacking,
}

/// One entry of the catalog
#[derive(Clone)]
pub struct Candidate {
    name: String,
    grid: Option<ParamGrid>,
    factory: ModelFactory,
}

impl Candidate {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&HyperParams, u64) -> Result<TrainedModel> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            grid: None,
            factory: Arc::new(factory),
        }
    }

    pub fn with_grid(mut self, grid: ParamGrid) -> Self {
        self.grid = Some(grid);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The search grid; `None` or an empty grid means "defaults only"
    pub fn grid(&self) -> Option<&ParamGrid> {
        self.grid.as_ref().filter(|g| !g.is_empty())
    }

    /// Build an unfitted model
    pub fn build(&self, params: &HyperParams, seed: u64) -> Result<TrainedModel> {
        (self.factory)(params, seed)
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("name", &self.name)
            .field("grid", &self.grid)
            .finish()
    }
}

/// Ordered candidate list
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    candidates: Vec<Candidate>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_variant(variant: CatalogVariant) -> Self {
        match variant {
            CatalogVariant::Standard => Self::standard(),
            CatalogVariant::WithStacking => Self::with_stacking(),
        }
    }

    /// Logistic regression, decision tree, random forest, extra-trees,
    /// gradient boosting, AdaBoost, symmetric-tree boosting, SVC, KNN
    pub fn standard() -> Self {
        Self::new()
            .push(
                Candidate::new("LogisticRegression", |params, _seed| {
                    Ok(TrainedModel::LogisticRegression(
                        LogisticRegression::new()
                            .with_c(param_f64(params, "C", 1.0))
                            .with_max_iter(1000),
                    ))
                })
                .with_grid(ParamGrid::new().with(
                    "C",
                    vec![
                        ParamValue::Float(0.01),
                        ParamValue::Float(0.1),
                        ParamValue::Float(1.0),
                        ParamValue::Float(10.0),
                    ],
                )),
            )
            .push(Candidate::new("DecisionTree", |_params, seed| {
                Ok(TrainedModel::DecisionTree(
                    DecisionTree::new_classifier().with_random_state(seed),
                ))
            }))
            .push(
                Candidate::new("RandomForest", |params, seed| {
                    let mut model = RandomForest::new_classifier(param_usize(params, "n_estimators", 100))
                        .with_random_state(seed);
                    if let Some(depth) = param_opt_usize(params, "max_depth", None) {
                        model = model.with_max_depth(depth);
                    }
                    Ok(TrainedModel::RandomForest(model))
                })
                .with_grid(
                    ParamGrid::new()
                        .with("n_estimators", vec![ParamValue::Int(50), ParamValue::Int(100)])
                        .with(
                            "max_depth",
                            vec![ParamValue::None, ParamValue::Int(10), ParamValue::Int(20)],
                        ),
                ),
            )
            .push(Candidate::new("ExtraTrees", |_params, seed| {
                Ok(TrainedModel::ExtraTrees(
                    ExtraTrees::new_classifier(100).with_random_state(seed),
                ))
            }))
            .push(Candidate::new("GradientBoosting", |_params, seed| {
                Ok(TrainedModel::GradientBoostingClassifier(GradientBoostingClassifier::new(
                    GradientBoostingConfig {
                        random_state: Some(seed),
                        ..Default::default()
                    },
                )))
            }))
            .push(Candidate::new("AdaBoost", |_params, _seed| {
                Ok(TrainedModel::AdaBoostClassifier(AdaBoostClassifier::default()))
            }))
            .push(
                Candidate::new("CatBoost", |params, seed| {
                    let config = CatBoostConfig::default()
                        .with_iterations(param_usize(params, "iterations", 100))
                        .with_depth(param_usize(params, "depth", 6))
                        .with_learning_rate(param_f64(params, "learning_rate", 0.1))
                        .with_random_state(seed);
                    Ok(TrainedModel::CatBoostClassifier(CatBoostClassifier::new(config)))
                })
                .with_grid(
                    ParamGrid::new()
                        .with("iterations", vec![ParamValue::Int(100), ParamValue::Int(200)])
                        .with("depth", vec![ParamValue::Int(4), ParamValue::Int(6)])
                        .with(
                            "learning_rate",
                            vec![ParamValue::Float(0.01), ParamValue::Float(0.1)],
                        ),
                ),
            )
            .push(Candidate::new("SVC", |_params, _seed| {
                Ok(TrainedModel::SVMClassifier(SVMClassifier::default()))
            }))
            .push(Candidate::new("KNeighbors", |_params, _seed| {
                Ok(TrainedModel::KNNClassifier(KNNClassifier::default()))
            }))
    }

    /// The standard catalog followed by the stacking ensemble
    pub fn with_stacking() -> Self {
        Self::standard().push(Candidate::new("Stacking", |_params, seed| {
            Ok(stacking_classifier(seed))
        }))
    }

    /// Append a candidate
    pub fn push(mut self, candidate: Candidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn names(&self) -> Vec<&str> {
        self.candidates.iter().map(Candidate::name).collect()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Stacking ensemble over forest, boosting and neighbour bases with a
/// logistic-regression meta-learner
pub fn stacking_classifier(seed: u64) -> TrainedModel {
    let model = StackingClassifier::new(StackingConfig::default())
        .add_base_model(TrainedModel::RandomForest(
            RandomForest::new_classifier(100).with_random_state(seed),
        ))
        .add_base_model(TrainedModel::ExtraTrees(
            ExtraTrees::new_classifier(100).with_random_state(seed.wrapping_add(1)),
        ))
        .add_base_model(TrainedModel::GradientBoostingClassifier(GradientBoostingClassifier::new(
            GradientBoostingConfig {
                random_state: Some(seed.wrapping_add(2)),
                ..Default::default()
            },
        )))
        .add_base_model(TrainedModel::KNNClassifier(KNNClassifier::default()))
        .with_meta_learner(LogisticRegression::new().with_max_iter(1000));
    TrainedModel::StackingClassifier(Box::new(model))
}

/// Regression counterpart of [`stacking_classifier`] with a ridge meta-learner
pub fn stacking_regressor(seed: u64) -> TrainedModel {
    let model = StackingRegressor::new(StackingConfig::default())
        .add_base_model(TrainedModel::RandomForest(
            RandomForest::new_regressor(100).with_random_state(seed),
        ))
        .add_base_model(TrainedModel::GradientBoostingRegressor(GradientBoostingRegressor::new(
            GradientBoostingConfig {
                random_state: Some(seed.wrapping_add(2)),
                ..Default::default()
            },
        )))
        .add_base_model(TrainedModel::KNNRegressor(KNNRegressor::default()));
    TrainedModel::StackingRegressor(Box::new(model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::models::Estimator;

    #[test]
    fn test_standard_catalog_order() {
        let catalog = Catalog::standard();
        assert_eq!(
            catalog.names(),
            vec![
                "LogisticRegression",
                "DecisionTree",
                "RandomForest",
                "ExtraTrees",
                "GradientBoosting",
                "AdaBoost",
                "CatBoost",
                "SVC",
                "KNeighbors",
            ]
        );
    }

    #[test]
    fn test_stacking_variant_appends_ensemble() {
        let catalog = Catalog::for_variant(CatalogVariant::WithStacking);
        assert_eq!(catalog.len(), 10);
        assert_eq!(catalog.names().last(), Some(&"Stacking"));
    }

    #[test]
    fn test_grids() {
        let catalog = Catalog::standard();
        let sizes: Vec<usize> = catalog
            .candidates()
            .iter()
            .map(|c| c.grid().map_or(0, ParamGrid::len))
            .collect();
        assert_eq!(sizes, vec![4, 0, 6, 0, 0, 0, 8, 0, 0]);
    }

    #[test]
    fn test_factory_applies_params() {
        let catalog = Catalog::standard();
        let forest = &catalog.candidates()[2];
        let mut params = HyperParams::new();
        params.insert("n_estimators".to_string(), ParamValue::Int(50));
        params.insert("max_depth".to_string(), ParamValue::None);
        match forest.build(&params, 7).unwrap() {
            TrainedModel::RandomForest(rf) => {
                assert_eq!(rf.n_estimators, 50);
                assert_eq!(rf.max_depth, None);
                assert_eq!(rf.random_state, Some(7));
            }
            other => panic!("unexpected model {}", other.family()),
        }
        let regressor = stacking_regressor(1);
        assert!(regressor.is_regressor());
    }
}
