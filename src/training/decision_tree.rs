//! Decision tree implementation

use crate::error::{QualityError, Result};
use super::models::{check_features, check_xy, class_position, unique_classes, Estimator};
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value and, for classifiers, the class distribution
    Leaf {
        value: f64,
        distribution: Vec<f64>,
        n_samples: usize,
    },
    /// Internal node with split
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

impl TreeNode {
    fn leaf_for(&self, sample: &[f64]) -> &TreeNode {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { .. } => return node,
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if sample[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Entropy (classification)
    Entropy,
    /// Mean squared error (regression)
    MSE,
}

/// How split thresholds are chosen
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum SplitStrategy {
    /// Exhaustive search over midpoints of sorted feature values
    Best,
    /// One uniformly drawn threshold per candidate feature (extremely randomized trees)
    Random,
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Number of features considered at each node; all when `None`
    pub max_features: Option<usize>,
    pub criterion: Criterion,
    pub splitter: SplitStrategy,
    pub random_state: Option<u64>,
    n_features: usize,
    is_classification: bool,
    classes: Vec<f64>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

/// Training data shared by every recursive call
struct BuildContext<'a> {
    x: &'a Array2<f64>,
    y: &'a Array1<f64>,
    /// Class position of each sample (classification only)
    y_class: Vec<usize>,
    n_classes: usize,
}

/// Best split found for one feature
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

impl DecisionTree {
    /// Create a new classifier tree
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            criterion: Criterion::Gini,
            splitter: SplitStrategy::Best,
            random_state: None,
            n_features: 0,
            is_classification: true,
            classes: Vec::new(),
        }
    }

    /// Create a new regressor tree
    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::MSE,
            is_classification: false,
            ..Self::new_classifier()
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Set the number of features examined per node
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    /// Set criterion
    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_splitter(mut self, splitter: SplitStrategy) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn is_classifier(&self) -> bool {
        self.is_classification
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_xy(x, y)?;
        if self.is_classification && self.criterion == Criterion::MSE {
            return Err(QualityError::InvalidConfig(
                "MSE criterion is only valid for regression trees".to_string(),
            ));
        }

        self.n_features = x.ncols();
        let (y_class, n_classes) = if self.is_classification {
            self.classes = unique_classes(y);
            let positions = y
                .iter()
                .map(|&v| class_position(&self.classes, v).unwrap_or(0))
                .collect();
            (positions, self.classes.len())
        } else {
            (Vec::new(), 0)
        };

        let ctx = BuildContext { x, y, y_class, n_classes };
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state.unwrap_or(0));
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.root = Some(self.build_tree(&ctx, &indices, 0, &mut rng));

        Ok(self)
    }

    fn build_tree(
        &self,
        ctx: &BuildContext<'_>,
        indices: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let impurity = self.node_impurity(ctx, indices);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || impurity <= 1e-12;

        if should_stop {
            return self.make_leaf(ctx, indices);
        }

        let Some(best) = self.find_best_split(ctx, indices, impurity, rng) else {
            return self.make_leaf(ctx, indices);
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| ctx.x[[i, best.feature_idx]] <= best.threshold);

        if left_indices.len() < self.min_samples_leaf || right_indices.len() < self.min_samples_leaf {
            return self.make_leaf(ctx, indices);
        }

        let left = Box::new(self.build_tree(ctx, &left_indices, depth + 1, rng));
        let right = Box::new(self.build_tree(ctx, &right_indices, depth + 1, rng));

        TreeNode::Split {
            feature_idx: best.feature_idx,
            threshold: best.threshold,
            left,
            right,
            n_samples,
        }
    }

    fn find_best_split(
        &self,
        ctx: &BuildContext<'_>,
        indices: &[usize],
        parent_impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitCandidate> {
        let n_features = ctx.x.ncols();
        let mut features: Vec<usize> = (0..n_features).collect();
        if let Some(k) = self.max_features.filter(|&k| k < n_features) {
            features.shuffle(rng);
            features.truncate(k);
            features.sort_unstable();
        }

        // Random thresholds are drawn up front so the parallel scan stays deterministic
        let random_thresholds: Vec<Option<f64>> = match self.splitter {
            SplitStrategy::Best => vec![None; features.len()],
            SplitStrategy::Random => features
                .iter()
                .map(|&f| {
                    let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                        let v = ctx.x[[i, f]];
                        (lo.min(v), hi.max(v))
                    });
                    if hi > lo {
                        Some(rng.gen_range(lo..hi))
                    } else {
                        None
                    }
                })
                .collect(),
        };

        let results: Vec<Option<SplitCandidate>> = features
            .par_iter()
            .zip(random_thresholds.par_iter())
            .map(|(&feature_idx, threshold)| match self.splitter {
                SplitStrategy::Best => self.best_threshold(ctx, indices, feature_idx, parent_impurity),
                SplitStrategy::Random => threshold.and_then(|t| {
                    self.evaluate_threshold(ctx, indices, feature_idx, t, parent_impurity)
                }),
            })
            .collect();

        let mut best: Option<SplitCandidate> = None;
        for candidate in results.into_iter().flatten() {
            if best.as_ref().map_or(true, |b| candidate.gain > b.gain) {
                best = Some(candidate);
            }
        }
        best.filter(|b| b.gain > 1e-12)
    }

    /// Sweep the sorted feature values once, tracking left/right statistics
    fn best_threshold(
        &self,
        ctx: &BuildContext<'_>,
        indices: &[usize],
        feature_idx: usize,
        parent_impurity: f64,
    ) -> Option<SplitCandidate> {
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_by(|&a, &b| ctx.x[[a, feature_idx]].total_cmp(&ctx.x[[b, feature_idx]]));

        let n = sorted.len();
        let mut stats_left = NodeStats::new(ctx.n_classes);
        let mut stats_right = NodeStats::new(ctx.n_classes);
        for &i in &sorted {
            stats_right.add(ctx, i);
        }

        let mut best: Option<SplitCandidate> = None;
        for pos in 0..n - 1 {
            let idx = sorted[pos];
            stats_left.add(ctx, idx);
            stats_right.remove(ctx, idx);

            let left_count = pos + 1;
            let right_count = n - left_count;
            let current = ctx.x[[idx, feature_idx]];
            let next = ctx.x[[sorted[pos + 1], feature_idx]];
            if next - current <= 1e-12
                || left_count < self.min_samples_leaf
                || right_count < self.min_samples_leaf
            {
                continue;
            }

            let weighted = (left_count as f64 * stats_left.impurity(self.criterion)
                + right_count as f64 * stats_right.impurity(self.criterion))
                / n as f64;
            let gain = parent_impurity - weighted;
            if best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature_idx,
                    threshold: (current + next) / 2.0,
                    gain,
                });
            }
        }
        best
    }

    fn evaluate_threshold(
        &self,
        ctx: &BuildContext<'_>,
        indices: &[usize],
        feature_idx: usize,
        threshold: f64,
        parent_impurity: f64,
    ) -> Option<SplitCandidate> {
        let mut left = NodeStats::new(ctx.n_classes);
        let mut right = NodeStats::new(ctx.n_classes);
        for &i in indices {
            if ctx.x[[i, feature_idx]] <= threshold {
                left.add(ctx, i);
            } else {
                right.add(ctx, i);
            }
        }
        if left.count < self.min_samples_leaf || right.count < self.min_samples_leaf {
            return None;
        }
        let n = indices.len() as f64;
        let weighted = (left.count as f64 * left.impurity(self.criterion)
            + right.count as f64 * right.impurity(self.criterion))
            / n;
        Some(SplitCandidate {
            feature_idx,
            threshold,
            gain: parent_impurity - weighted,
        })
    }

    fn node_impurity(&self, ctx: &BuildContext<'_>, indices: &[usize]) -> f64 {
        let mut stats = NodeStats::new(ctx.n_classes);
        for &i in indices {
            stats.add(ctx, i);
        }
        stats.impurity(self.criterion)
    }

    fn make_leaf(&self, ctx: &BuildContext<'_>, indices: &[usize]) -> TreeNode {
        let n_samples = indices.len();
        if self.is_classification {
            let mut counts = vec![0.0; ctx.n_classes];
            for &i in indices {
                counts[ctx.y_class[i]] += 1.0;
            }
            let mut best = 0;
            for (k, &c) in counts.iter().enumerate() {
                if c > counts[best] {
                    best = k;
                }
            }
            let total = n_samples.max(1) as f64;
            TreeNode::Leaf {
                value: self.classes[best],
                distribution: counts.iter().map(|c| c / total).collect(),
                n_samples,
            }
        } else {
            let mean = indices.iter().map(|&i| ctx.y[i]).sum::<f64>() / n_samples.max(1) as f64;
            TreeNode::Leaf {
                value: mean,
                distribution: Vec::new(),
                n_samples,
            }
        }
    }

    fn root(&self) -> Result<&TreeNode> {
        self.root.as_ref().ok_or(QualityError::ModelNotFitted)
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root()?;
        check_features(x, self.n_features)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| match root.leaf_for(&row.to_vec()) {
                TreeNode::Leaf { value, .. } => *value,
                TreeNode::Split { .. } => f64::NAN,
            })
            .collect())
    }

    /// Predict class probabilities (classification only)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let root = self.root()?;
        if !self.is_classification {
            return Err(QualityError::Training(
                "predict_proba is only available for classification".to_string(),
            ));
        }
        check_features(x, self.n_features)?;
        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            if let TreeNode::Leaf { distribution, .. } = root.leaf_for(&row.to_vec()) {
                for (k, &p) in distribution.iter().enumerate() {
                    proba[[i, k]] = p;
                }
            }
        }
        Ok(proba)
    }

    /// Depth of the fitted tree (a single leaf has depth 0)
    pub fn depth(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        self.root.as_ref().map_or(0, walk)
    }
}

/// Running class counts or moments for one side of a split
struct NodeStats {
    count: usize,
    class_counts: Vec<f64>,
    sum: f64,
    sq_sum: f64,
}

impl NodeStats {
    fn new(n_classes: usize) -> Self {
        Self {
            count: 0,
            class_counts: vec![0.0; n_classes],
            sum: 0.0,
            sq_sum: 0.0,
        }
    }

    fn add(&mut self, ctx: &BuildContext<'_>, i: usize) {
        self.count += 1;
        if ctx.n_classes > 0 {
            self.class_counts[ctx.y_class[i]] += 1.0;
        } else {
            let v = ctx.y[i];
            self.sum += v;
            self.sq_sum += v * v;
        }
    }

    fn remove(&mut self, ctx: &BuildContext<'_>, i: usize) {
        self.count -= 1;
        if ctx.n_classes > 0 {
            self.class_counts[ctx.y_class[i]] -= 1.0;
        } else {
            let v = ctx.y[i];
            self.sum -= v;
            self.sq_sum -= v * v;
        }
    }

    fn impurity(&self, criterion: Criterion) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        match criterion {
            Criterion::Gini => 1.0 - self.class_counts.iter().map(|c| (c / n).powi(2)).sum::<f64>(),
            Criterion::Entropy => -self
                .class_counts
                .iter()
                .filter(|&&c| c > 0.0)
                .map(|c| {
                    let p = c / n;
                    p * p.ln()
                })
                .sum::<f64>(),
            // Var = E[X²] - E[X]²
            Criterion::MSE => (self.sq_sum / n - (self.sum / n).powi(2)).max(0.0),
        }
    }
}

impl Estimator for DecisionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        DecisionTree::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        DecisionTree::predict(self, x)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        if self.is_classification {
            DecisionTree::predict_proba(self, x).map(Some)
        } else {
            Ok(None)
        }
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }

    fn is_regressor(&self) -> bool {
        !self.is_classification
    }
}
