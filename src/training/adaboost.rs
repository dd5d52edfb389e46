//! AdaBoost (Adaptive Boosting) implementation
//!
//! AdaBoost builds an ensemble of weak learners (decision stumps), weighting
//! misclassified samples more heavily in subsequent rounds. Multi-class
//! problems use the SAMME update.

use crate::error::{QualityError, Result};
use super::models::{check_xy, class_position, proba_to_classes, softmax_rows, unique_classes, Estimator};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// A single decision stump: splits on one feature at one threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Stump {
    feature_index: usize,
    threshold: f64,
    /// Class position when feature <= threshold
    left_class: usize,
    /// Class position when feature > threshold
    right_class: usize,
}

impl Stump {
    fn predict_row(&self, x: &Array2<f64>, row: usize) -> usize {
        if x[[row, self.feature_index]] <= self.threshold {
            self.left_class
        } else {
            self.right_class
        }
    }
}

/// AdaBoost Classifier (SAMME variant, supports multi-class)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaBoostClassifier {
    pub n_estimators: usize,
    pub learning_rate: f64,
    stumps: Vec<Stump>,
    alphas: Vec<f64>,
    classes: Vec<f64>,
    n_features: usize,
}

impl Default for AdaBoostClassifier {
    fn default() -> Self {
        Self::new(50, 1.0)
    }
}

impl AdaBoostClassifier {
    pub fn new(n_estimators: usize, learning_rate: f64) -> Self {
        Self {
            n_estimators,
            learning_rate,
            stumps: Vec::new(),
            alphas: Vec::new(),
            classes: Vec::new(),
            n_features: 0,
        }
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn n_stumps(&self) -> usize {
        self.stumps.len()
    }

    /// Find the stump with the lowest weighted error.
    ///
    /// Each feature is swept once in sorted order while the per-class weight
    /// on the left side is updated incrementally; both sides predict their
    /// weighted majority class.
    fn fit_stump(x: &Array2<f64>, y_idx: &[usize], weights: &Array1<f64>, n_classes: usize) -> (Stump, f64) {
        let n_samples = x.nrows();
        let mut total = vec![0.0; n_classes];
        for (i, &k) in y_idx.iter().enumerate() {
            total[k] += weights[i];
        }
        let total_weight: f64 = total.iter().sum();

        let majority = |w: &[f64]| -> (usize, f64) {
            let mut best = 0;
            for (k, &v) in w.iter().enumerate() {
                if v > w[best] {
                    best = k;
                }
            }
            (best, w[best])
        };

        // Constant stump as the fallback when no feature can be split
        let (all_class, all_weight) = majority(&total);
        let mut best_stump = Stump {
            feature_index: 0,
            threshold: f64::INFINITY,
            left_class: all_class,
            right_class: all_class,
        };
        let mut best_error = total_weight - all_weight;

        let mut order: Vec<usize> = (0..n_samples).collect();
        for f in 0..x.ncols() {
            order.sort_by(|&a, &b| x[[a, f]].total_cmp(&x[[b, f]]));
            let mut left = vec![0.0; n_classes];
            for pos in 0..n_samples - 1 {
                let i = order[pos];
                left[y_idx[i]] += weights[i];
                let current = x[[i, f]];
                let next = x[[order[pos + 1], f]];
                if next <= current {
                    continue;
                }
                let right: Vec<f64> = total.iter().zip(left.iter()).map(|(t, l)| t - l).collect();
                let (left_class, left_correct) = majority(&left);
                let (right_class, right_correct) = majority(&right);
                let error = total_weight - left_correct - right_correct;
                if error < best_error - 1e-12 {
                    best_error = error;
                    best_stump = Stump {
                        feature_index: f,
                        threshold: (current + next) / 2.0,
                        left_class,
                        right_class,
                    };
                }
            }
        }
        (best_stump, best_error / total_weight.max(f64::MIN_POSITIVE))
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_xy(x, y)?;
        if self.n_estimators == 0 || self.learning_rate <= 0.0 {
            return Err(QualityError::InvalidConfig(format!(
                "AdaBoost needs n_estimators >= 1 and learning_rate > 0, got {} and {}",
                self.n_estimators, self.learning_rate
            )));
        }
        let n_samples = x.nrows();
        self.classes = unique_classes(y);
        self.n_features = x.ncols();
        let n_classes = self.classes.len();
        let y_idx: Vec<usize> = y
            .iter()
            .map(|&v| class_position(&self.classes, v).unwrap_or(0))
            .collect();

        let mut weights = Array1::from_elem(n_samples, 1.0 / n_samples as f64);
        self.stumps.clear();
        self.alphas.clear();

        for _round in 0..self.n_estimators {
            let (stump, error) = Self::fit_stump(x, &y_idx, &weights, n_classes);

            // A perfect stump decides on its own
            if error <= 0.0 {
                self.stumps.push(stump);
                self.alphas.push(1.0);
                break;
            }
            // No better than chance: stop boosting
            if error >= 1.0 - 1.0 / n_classes as f64 {
                if self.stumps.is_empty() {
                    self.stumps.push(stump);
                    self.alphas.push(1.0);
                }
                break;
            }

            let alpha = self.learning_rate
                * (((1.0 - error) / error).ln() + (n_classes as f64 - 1.0).max(1.0).ln());

            for i in 0..n_samples {
                if stump.predict_row(x, i) != y_idx[i] {
                    weights[i] *= alpha.exp();
                }
            }
            let w_sum = weights.sum();
            if w_sum > 0.0 {
                weights /= w_sum;
            }

            self.stumps.push(stump);
            self.alphas.push(alpha);
        }

        Ok(self)
    }

    /// Alpha-weighted class votes normalised by the total alpha
    fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.stumps.is_empty() {
            return Err(QualityError::ModelNotFitted);
        }
        super::models::check_features(x, self.n_features)?;
        let n_classes = self.classes.len();
        let alpha_sum: f64 = self.alphas.iter().sum();
        let mut scores = Array2::zeros((x.nrows(), n_classes));
        for i in 0..x.nrows() {
            for (stump, &alpha) in self.stumps.iter().zip(self.alphas.iter()) {
                scores[[i, stump.predict_row(x, i)]] += alpha;
            }
        }
        if alpha_sum > 0.0 {
            scores /= alpha_sum;
        }
        Ok(scores)
    }
}

impl Estimator for AdaBoostClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        AdaBoostClassifier::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scores = self.decision_function(x)?;
        Ok(proba_to_classes(&scores, &self.classes))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        let scores = self.decision_function(x)?;
        let scale = (self.classes.len() as f64 - 1.0).max(1.0);
        Ok(Some(softmax_rows(&(scores / scale))))
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}
