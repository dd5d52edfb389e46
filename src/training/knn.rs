//! K-Nearest Neighbors implementation
//!
//! KNN classifier and regressor with distance metrics.

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::models::{check_features, check_xy, class_position, proba_to_classes, unique_classes, Estimator};
use crate::error::{QualityError, Result};

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum DistanceMetric {
    /// Euclidean distance (L2)
    #[default]
    Euclidean,
    /// Manhattan distance (L1)
    Manhattan,
    /// Minkowski distance with parameter p
    Minkowski(f64),
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum WeightScheme {
    /// All neighbors have equal weight
    #[default]
    Uniform,
    /// Closer neighbors have more weight (inverse distance)
    Distance,
}

/// KNN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNConfig {
    /// Number of neighbors
    pub n_neighbors: usize,
    /// Distance metric
    pub metric: DistanceMetric,
    /// Weighting scheme
    pub weights: WeightScheme,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            metric: DistanceMetric::Euclidean,
            weights: WeightScheme::Uniform,
        }
    }
}

/// Stored training set shared by the classifier and the regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Memory {
    x: Array2<f64>,
    y: Array1<f64>,
}

impl Memory {
    fn store(config: &KNNConfig, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self> {
        check_xy(x, y)?;
        if config.n_neighbors == 0 {
            return Err(QualityError::InvalidConfig("n_neighbors must be at least 1".to_string()));
        }
        Ok(Self { x: x.clone(), y: y.clone() })
    }

    fn neighbors_of(&self, config: &KNNConfig, x: &Array2<f64>) -> Result<Vec<Vec<(f64, f64)>>> {
        check_features(x, self.x.ncols())?;
        let k = config.n_neighbors.min(self.x.nrows());
        Ok((0..x.nrows())
            .into_par_iter()
            .map(|i| find_k_nearest(x.row(i), &self.x, &self.y, k, config.metric))
            .collect())
    }
}

/// K-Nearest Neighbors Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNClassifier {
    config: KNNConfig,
    memory: Option<Memory>,
    classes: Vec<f64>,
}

impl Default for KNNClassifier {
    fn default() -> Self {
        Self::new(KNNConfig::default())
    }
}

impl KNNClassifier {
    pub fn new(config: KNNConfig) -> Self {
        Self { config, memory: None, classes: Vec::new() }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig { n_neighbors: k, ..Default::default() })
    }
}

impl Estimator for KNNClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.memory = Some(Memory::store(&self.config, x, y)?);
        self.classes = unique_classes(y);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?.ok_or(QualityError::ModelNotFitted)?;
        Ok(proba_to_classes(&proba, &self.classes))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        let memory = self.memory.as_ref().ok_or(QualityError::ModelNotFitted)?;
        let neighbors = memory.neighbors_of(&self.config, x)?;
        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row_neighbors) in neighbors.iter().enumerate() {
            let mut total = 0.0;
            for &(dist, label) in row_neighbors {
                let weight = neighbor_weight(dist, self.config.weights);
                if let Some(k) = class_position(&self.classes, label) {
                    proba[[i, k]] += weight;
                    total += weight;
                }
            }
            if total > 0.0 {
                proba.row_mut(i).mapv_inplace(|v| v / total);
            }
        }
        Ok(Some(proba))
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}

/// K-Nearest Neighbors Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNRegressor {
    config: KNNConfig,
    memory: Option<Memory>,
}

impl Default for KNNRegressor {
    fn default() -> Self {
        Self::new(KNNConfig::default())
    }
}

impl KNNRegressor {
    pub fn new(config: KNNConfig) -> Self {
        Self { config, memory: None }
    }

    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig { n_neighbors: k, ..Default::default() })
    }
}

impl Estimator for KNNRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.memory = Some(Memory::store(&self.config, x, y)?);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let memory = self.memory.as_ref().ok_or(QualityError::ModelNotFitted)?;
        let neighbors = memory.neighbors_of(&self.config, x)?;
        Ok(neighbors
            .iter()
            .map(|n| weighted_mean_from(n, self.config.weights))
            .collect())
    }

    fn is_regressor(&self) -> bool {
        true
    }
}

// ============================================================================
// Shared helpers (used by both Classifier and Regressor)
// ============================================================================

/// Max-heap entry for partial sort (keeps k smallest distances).
/// Equal distances order by training index so earlier rows win.
struct Neighbor {
    dist: f64,
    index: usize,
    label: f64,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Neighbor {}
impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.total_cmp(&other.dist).then(self.index.cmp(&other.index))
    }
}

/// Find k nearest neighbors using a max-heap, O(n log k)
fn find_k_nearest(
    point: ArrayView1<f64>,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    k: usize,
    metric: DistanceMetric,
) -> Vec<(f64, f64)> {
    let mut heap = BinaryHeap::with_capacity(k + 1);
    for (index, row) in x_train.rows().into_iter().enumerate() {
        let candidate = Neighbor { dist: compute_distance(point, row, metric), index, label: y_train[index] };
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().is_some_and(|top| candidate < *top) {
            heap.pop();
            heap.push(candidate);
        }
    }
    heap.into_sorted_vec().into_iter().map(|n| (n.dist, n.label)).collect()
}

/// Compute distance between two points using the specified metric
fn compute_distance(a: ArrayView1<f64>, b: ArrayView1<f64>, metric: DistanceMetric) -> f64 {
    let pairs = a.iter().zip(b.iter());
    match metric {
        DistanceMetric::Euclidean => pairs.map(|(ai, bi)| (ai - bi) * (ai - bi)).sum::<f64>().sqrt(),
        DistanceMetric::Manhattan => pairs.map(|(ai, bi)| (ai - bi).abs()).sum(),
        DistanceMetric::Minkowski(p) => pairs
            .map(|(ai, bi)| (ai - bi).abs().powf(p))
            .sum::<f64>()
            .powf(1.0 / p),
    }
}

fn neighbor_weight(dist: f64, weights: WeightScheme) -> f64 {
    match weights {
        WeightScheme::Uniform => 1.0,
        WeightScheme::Distance => 1.0 / (dist + 1e-10),
    }
}

/// Compute weighted mean for regression
fn weighted_mean_from(neighbors: &[(f64, f64)], weights: WeightScheme) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for &(dist, y) in neighbors {
        let w = neighbor_weight(dist, weights);
        weighted_sum += w * y;
        weight_total += w;
    }
    if weight_total > 0.0 { weighted_sum / weight_total } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn create_classification_data() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [0.0, 0.0], [0.1, 0.2], [0.2, 0.1], [0.3, 0.3],
            [5.0, 5.0], [5.1, 5.2], [5.2, 5.1], [5.3, 5.3],
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_knn_classifier() {
        let (x, y) = create_classification_data();
        let mut knn = KNNClassifier::with_k(3);
        knn.fit(&x, &y).unwrap();
        let preds = knn.predict(&array![[0.15, 0.15], [5.15, 5.15]]).unwrap();
        assert_eq!(preds, array![0.0, 1.0]);

        let proba = knn.predict_proba(&array![[0.15, 0.15]]).unwrap().unwrap();
        assert!((proba[[0, 0]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_knn_regressor() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let y = array![0.0, 2.0, 4.0, 6.0, 8.0];
        let mut knn = KNNRegressor::with_k(2);
        knn.fit(&x, &y).unwrap();
        assert!(knn.is_regressor());
        let preds = knn.predict(&array![[1.4]]).unwrap();
        assert!((preds[0] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_distance_metrics() {
        let a = array![0.0, 0.0];
        let b = array![3.0, 4.0];
        assert!((compute_distance(a.view(), b.view(), DistanceMetric::Euclidean) - 5.0).abs() < 1e-12);
        assert!((compute_distance(a.view(), b.view(), DistanceMetric::Manhattan) - 7.0).abs() < 1e-12);
        assert!((compute_distance(a.view(), b.view(), DistanceMetric::Minkowski(2.0)) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_knn() {
        let x = array![[0.0], [1.0], [10.0]];
        let y = array![0.0, 0.0, 1.0];
        let mut knn = KNNClassifier::new(KNNConfig { n_neighbors: 3, weights: WeightScheme::Distance, ..Default::default() });
        knn.fit(&x, &y).unwrap();
        let proba = knn.predict_proba(&array![[9.5]]).unwrap().unwrap();
        assert!(proba[[0, 1]] > proba[[0, 0]]);
    }

    #[test]
    fn test_knn_unfitted() {
        let knn = KNNClassifier::with_k(3);
        assert!(matches!(knn.predict(&array![[0.0]]), Err(QualityError::ModelNotFitted)));
    }
}
