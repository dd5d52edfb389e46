//! Model search and selection
//!
//! Every catalog candidate is scored by cross-validated accuracy on the
//! training split. Candidates with a grid run a grid search on `grid_cv_folds`
//! folds and are refit with their best parameters; the rest run plain
//! `plain_cv_folds`-fold cross-validation and one full fit. The strictly best
//! mean score wins, so earlier candidates win ties. A failing candidate is
//! logged, recorded and skipped.

use super::catalog::{Candidate, Catalog};
use super::cross_validation::{CVResults, CrossValidator};
use super::grid_search::{describe, HyperParams};
use super::metrics::{accuracy_score, HeldOutMetrics};
use super::models::{Estimator, TrainedModel};
use crate::error::{CandidateFailure, QualityError, Result};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Selector settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub seed: u64,
    /// Folds used when a candidate has a grid
    pub grid_cv_folds: usize,
    /// Folds used for candidates without a grid
    pub plain_cv_folds: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            grid_cv_folds: 3,
            plain_cv_folds: 5,
        }
    }
}

/// Label values seen by the models and the names shown in reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassLabels {
    pub values: Vec<f64>,
    pub names: Vec<String>,
}

impl ClassLabels {
    /// Contiguous class indices `0..names.len()`
    pub fn indexed(names: Vec<String>) -> Self {
        Self {
            values: (0..names.len()).map(|i| i as f64).collect(),
            names,
        }
    }

    /// Raw numeric targets, each named by its own value
    pub fn numeric(values: Vec<f64>) -> Self {
        let names = values.iter().map(|v| v.to_string()).collect();
        Self { values, names }
    }
}

/// Cross-validation outcome of one candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    pub candidate: String,
    pub mean_cv_accuracy: f64,
    pub fold_scores: Vec<f64>,
    /// Best grid assignment, rendered as `name=value` pairs
    pub best_params: Option<String>,
    pub elapsed_secs: f64,
}

/// Everything a training run reports about the selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionReport {
    pub model_name: String,
    pub model_family: String,
    pub test_accuracy: f64,
    pub confusion_matrix: Vec<Vec<usize>>,
    pub classification_report: String,
    pub weighted_f1: f64,
    pub candidate_scores: Vec<CandidateScore>,
    pub failures: Vec<CandidateFailure>,
}

/// The fitted winner and its report
#[derive(Debug, Clone)]
pub struct Selection {
    pub model: TrainedModel,
    pub report: SelectionReport,
}

/// Parameters of the best-of-N search
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BestOfN {
    pub max_iterations: usize,
    pub target_accuracy: f64,
}

struct Evaluated {
    score: CandidateScore,
    model: TrainedModel,
}

/// Scores a catalog and keeps the best candidate
#[derive(Debug, Clone)]
pub struct ModelSelector {
    config: SelectorConfig,
    catalog: Catalog,
}

impl ModelSelector {
    pub fn new(config: SelectorConfig, catalog: Catalog) -> Self {
        Self { config, catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Search the catalog, fit the winner on the full training split and
    /// report its held-out metrics
    pub fn select(
        &self,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
        labels: &ClassLabels,
    ) -> Result<Selection> {
        let mut scores = Vec::with_capacity(self.catalog.len());
        let mut failures = Vec::new();
        let mut best: Option<Evaluated> = None;

        for candidate in self.catalog.candidates() {
            match self.evaluate(candidate, x_train, y_train) {
                Ok(evaluated) => {
                    info!(
                        candidate = candidate.name(),
                        cv_accuracy = evaluated.score.mean_cv_accuracy,
                        elapsed_secs = evaluated.score.elapsed_secs,
                        "Candidate scored"
                    );
                    scores.push(evaluated.score.clone());
                    let better = best
                        .as_ref()
                        .map_or(true, |b| evaluated.score.mean_cv_accuracy > b.score.mean_cv_accuracy);
                    if better {
                        best = Some(evaluated);
                    }
                }
                Err(e) => {
                    warn!(candidate = candidate.name(), error = %e, "Candidate failed, skipping");
                    failures.push(CandidateFailure {
                        candidate: candidate.name().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let winner = best.ok_or_else(|| QualityError::NoViableModel { failures: failures.clone() })?;
        info!(
            model = %winner.score.candidate,
            cv_accuracy = winner.score.mean_cv_accuracy,
            "Best model selected"
        );

        let y_pred = winner.model.predict_labels(x_test)?;
        let metrics = HeldOutMetrics::compute(y_test, &y_pred, &labels.values, &labels.names);
        Ok(Selection {
            report: build_report(&winner.score.candidate, &winner.model, metrics, scores, failures),
            model: winner.model,
        })
    }

    /// Refit one model family up to `max_iterations` times with seeds
    /// `seed + i`, keeping the best held-out accuracy and stopping as soon as
    /// a fit reaches the target
    pub fn select_best_of_n<F>(
        &self,
        name: &str,
        factory: F,
        search: BestOfN,
        x_train: &Array2<f64>,
        y_train: &Array1<f64>,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
        labels: &ClassLabels,
    ) -> Result<Selection>
    where
        F: Fn(u64) -> Result<TrainedModel>,
    {
        let mut best: Option<(f64, TrainedModel, Array1<f64>)> = None;
        let mut scores = Vec::new();
        let mut failures = Vec::new();

        for i in 0..search.max_iterations {
            let seed = self.config.seed.wrapping_add(i as u64);
            let start = Instant::now();
            let attempt = factory(seed).and_then(|mut model| {
                model.fit(x_train, y_train)?;
                let y_pred = model.predict_labels(x_test)?;
                Ok((model, y_pred))
            });
            let (model, y_pred) = match attempt {
                Ok(fitted) => fitted,
                Err(e) => {
                    warn!(iteration = i, seed, error = %e, "Fit failed, trying next seed");
                    failures.push(CandidateFailure {
                        candidate: format!("{} (seed {})", name, seed),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let accuracy = accuracy_score(y_test, &y_pred);
            info!(iteration = i, seed, accuracy, "Best-of-N fit scored");
            scores.push(CandidateScore {
                candidate: format!("{} (seed {})", name, seed),
                mean_cv_accuracy: accuracy,
                fold_scores: vec![accuracy],
                best_params: None,
                elapsed_secs: start.elapsed().as_secs_f64(),
            });
            if best.as_ref().map_or(true, |(b, _, _)| accuracy > *b) {
                best = Some((accuracy, model, y_pred));
            }
            if accuracy >= search.target_accuracy {
                info!(iteration = i, accuracy, target = search.target_accuracy, "Target accuracy reached");
                break;
            }
        }

        let (_, model, y_pred) = best.ok_or_else(|| QualityError::NoViableModel { failures: failures.clone() })?;
        let metrics = HeldOutMetrics::compute(y_test, &y_pred, &labels.values, &labels.names);
        Ok(Selection {
            report: build_report(name, &model, metrics, scores, failures),
            model,
        })
    }

    fn evaluate(&self, candidate: &Candidate, x: &Array2<f64>, y: &Array1<f64>) -> Result<Evaluated> {
        let start = Instant::now();
        let seed = self.config.seed;

        let (params, cv) = match candidate.grid() {
            Some(grid) => {
                let mut best: Option<(HyperParams, CVResults)> = None;
                for params in grid.expand() {
                    let cv = self.cross_validate(candidate, &params, self.config.grid_cv_folds, x, y)?;
                    debug!(
                        candidate = candidate.name(),
                        params = %describe(&params),
                        cv_accuracy = cv.mean_score,
                        "Grid point scored"
                    );
                    if best.as_ref().map_or(true, |(_, b)| cv.mean_score > b.mean_score) {
                        best = Some((params, cv));
                    }
                }
                let (params, cv) = best.ok_or_else(|| QualityError::Training("empty grid".to_string()))?;
                (Some(params), cv)
            }
            None => {
                let params = HyperParams::new();
                let cv = self.cross_validate(candidate, &params, self.config.plain_cv_folds, x, y)?;
                (None, cv)
            }
        };

        if !cv.mean_score.is_finite() {
            return Err(QualityError::Training(format!(
                "non-finite cross-validation score {}",
                cv.mean_score
            )));
        }

        let mut model = candidate.build(params.as_ref().unwrap_or(&HyperParams::new()), seed)?;
        model.fit(x, y)?;

        Ok(Evaluated {
            score: CandidateScore {
                candidate: candidate.name().to_string(),
                mean_cv_accuracy: cv.mean_score,
                fold_scores: cv.scores,
                best_params: params.as_ref().map(describe),
                elapsed_secs: start.elapsed().as_secs_f64(),
            },
            model,
        })
    }

    /// Accuracy on each stratified fold, folds evaluated in parallel
    fn cross_validate(
        &self,
        candidate: &Candidate,
        params: &HyperParams,
        n_folds: usize,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<CVResults> {
        let splits = CrossValidator::for_task(n_folds, false).split(y)?;
        let seed = self.config.seed;
        let scores = splits
            .par_iter()
            .map(|split| {
                let x_train = x.select(Axis(0), &split.train_indices);
                let y_train = y.select(Axis(0), &split.train_indices);
                let x_val = x.select(Axis(0), &split.test_indices);
                let y_val = y.select(Axis(0), &split.test_indices);

                let mut model = candidate.build(params, seed)?;
                model.fit(&x_train, &y_train)?;
                let y_pred = model.predict_labels(&x_val)?;
                Ok(accuracy_score(&y_val, &y_pred))
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(CVResults::from_scores(scores))
    }
}

fn build_report(
    name: &str,
    model: &TrainedModel,
    metrics: HeldOutMetrics,
    candidate_scores: Vec<CandidateScore>,
    failures: Vec<CandidateFailure>,
) -> SelectionReport {
    info!(
        model = name,
        test_accuracy = metrics.accuracy,
        weighted_f1 = metrics.weighted_f1,
        "Held-out evaluation complete"
    );
    SelectionReport {
        model_name: name.to_string(),
        model_family: model.family().to_string(),
        test_accuracy: metrics.accuracy,
        classification_report: metrics.report.to_string(),
        weighted_f1: metrics.weighted_f1,
        confusion_matrix: metrics.confusion_matrix,
        candidate_scores,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::catalog::stacking_classifier;
    use crate::training::decision_tree::DecisionTree;
    use crate::training::knn::KNNClassifier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn separable() -> (Array2<f64>, Array1<f64>) {
        let n = 60;
        let mut rows = Vec::with_capacity(n * 2);
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let class = (i % 2) as f64;
            let offset = ((i * 13) % 7) as f64 * 0.05;
            rows.extend_from_slice(&[class * 3.0 - 1.5 + offset, -(class * 2.0) + offset]);
            labels.push(class);
        }
        (Array2::from_shape_vec((n, 2), rows).unwrap(), Array1::from_vec(labels))
    }

    fn labels() -> ClassLabels {
        ClassLabels::indexed(vec!["bad".to_string(), "good".to_string()])
    }

    fn small_catalog() -> Catalog {
        Catalog::new()
            .push(Candidate::new("DecisionTree", |_p, seed| {
                Ok(TrainedModel::DecisionTree(DecisionTree::new_classifier().with_random_state(seed)))
            }))
            .push(Candidate::new("KNeighbors", |_p, _seed| {
                Ok(TrainedModel::KNNClassifier(KNNClassifier::with_k(3)))
            }))
    }

    #[test]
    fn test_select_prefers_earlier_candidate_on_tie() {
        let (x, y) = separable();
        let selector = ModelSelector::new(SelectorConfig::default(), small_catalog());
        let selection = selector.select(&x, &y, &x, &y, &labels()).unwrap();
        assert_eq!(selection.report.model_name, "DecisionTree");
        assert_eq!(selection.report.candidate_scores.len(), 2);
        assert!((selection.report.test_accuracy - 1.0).abs() < 1e-12);
        assert!(selection.report.failures.is_empty());
    }

    #[test]
    fn test_failing_candidate_is_recorded() {
        let (x, y) = separable();
        // Builds the first fold's model, then fails on the next one
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let catalog = Catalog::new()
            .push(Candidate::new("Flaky", move |_p, seed| {
                if counter.fetch_add(1, Ordering::SeqCst) > 0 {
                    return Err(QualityError::Training("fold fit failed".to_string()));
                }
                Ok(TrainedModel::DecisionTree(DecisionTree::new_classifier().with_random_state(seed)))
            }))
            .push(Candidate::new("KNeighbors", |_p, _seed| {
                Ok(TrainedModel::KNNClassifier(KNNClassifier::with_k(3)))
            }));
        let selector = ModelSelector::new(SelectorConfig::default(), catalog);
        let selection = selector.select(&x, &y, &x, &y, &labels()).unwrap();
        assert_eq!(selection.report.model_name, "KNeighbors");
        assert_eq!(selection.report.failures.len(), 1);
        assert_eq!(selection.report.failures[0].candidate, "Flaky");
        assert!(selection.report.failures[0].reason.contains("fold fit failed"));
        assert!(builds.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_no_viable_model() {
        let (x, y) = separable();
        let catalog = Catalog::new().push(Candidate::new("Broken", |_p, _seed| {
            Err(QualityError::Training("always fails".to_string()))
        }));
        let selector = ModelSelector::new(SelectorConfig::default(), catalog);
        match selector.select(&x, &y, &x, &y, &labels()) {
            Err(QualityError::NoViableModel { failures }) => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].reason.contains("always fails"));
            }
            other => panic!("expected NoViableModel, got {:?}", other.map(|s| s.report.model_name)),
        }
    }

    #[test]
    fn test_best_of_n_stops_at_target() {
        let (x, y) = separable();
        let selector = ModelSelector::new(SelectorConfig::default(), Catalog::new());
        let search = BestOfN { max_iterations: 5, target_accuracy: 0.5 };
        let selection = selector
            .select_best_of_n("Stacking", |seed| Ok(stacking_classifier(seed)), search, &x, &y, &x, &y, &labels())
            .unwrap();
        assert_eq!(selection.report.candidate_scores.len(), 1);
        assert_eq!(selection.report.model_family, "StackingClassifier");
        assert!(selection.report.test_accuracy >= 0.5);
    }
}
