//! CatBoost-style gradient boosting on symmetric trees
//!
//! Key features:
//! - Symmetric (oblivious) decision trees: all nodes at same depth use the same split
//! - Features are quantised once into border bins, splits are scored from histograms
//! - Multi-class softmax objective with one leaf vector per tree leaf

use crate::error::{QualityError, Result};
use super::models::{check_features, check_xy, class_position, proba_to_classes, softmax_rows, unique_classes, Estimator};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatBoostConfig {
    /// Number of boosting iterations (trees)
    pub iterations: usize,
    pub learning_rate: f64,
    /// Depth of every symmetric tree
    pub depth: usize,
    /// L2 regularisation on leaf values
    pub l2_leaf_reg: f64,
    /// Maximum number of split borders per feature
    pub border_count: usize,
    pub subsample: f64,
    pub random_state: Option<u64>,
}

impl Default for CatBoostConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            learning_rate: 0.1,
            depth: 6,
            l2_leaf_reg: 3.0,
            border_count: 128,
            subsample: 1.0,
            random_state: Some(42),
        }
    }
}

impl CatBoostConfig {
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }
}

/// Symmetric (oblivious) tree: each level uses the same split feature + threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SymmetricTree {
    splits: Vec<(usize, f64)>,
    /// `2^depth` leaves, each holding one value per class
    leaf_values: Vec<Vec<f64>>,
}

impl SymmetricTree {
    fn leaf_index(&self, x: &Array2<f64>, row: usize) -> usize {
        let mut idx = 0usize;
        for &(feature, threshold) in &self.splits {
            idx = idx * 2 + usize::from(x[[row, feature]] > threshold);
        }
        idx
    }
}

/// Quantised view of the training matrix
struct Binned {
    /// Split borders per feature, ascending
    borders: Vec<Vec<f64>>,
    /// `bins[f][i]` = number of borders strictly below `x[i, f]`
    bins: Vec<Vec<u16>>,
}

impl Binned {
    fn build(x: &Array2<f64>, border_count: usize) -> Self {
        let border_count = border_count.clamp(1, u16::MAX as usize - 1);
        let mut borders = Vec::with_capacity(x.ncols());
        let mut bins = Vec::with_capacity(x.ncols());
        for column in x.columns() {
            let mut values: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
            values.sort_by(|a, b| a.total_cmp(b));
            values.dedup();
            let mut feature_borders: Vec<f64> = values.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
            if feature_borders.len() > border_count {
                let step = feature_borders.len() as f64 / border_count as f64;
                feature_borders = (0..border_count)
                    .map(|b| feature_borders[((b as f64 + 0.5) * step) as usize])
                    .collect();
                feature_borders.dedup();
            }
            let feature_bins = column
                .iter()
                .map(|&v| feature_borders.partition_point(|&b| b < v) as u16)
                .collect();
            borders.push(feature_borders);
            bins.push(feature_bins);
        }
        Self { borders, bins }
    }
}

struct TreeBuilder<'a> {
    binned: &'a Binned,
    gradients: &'a Array2<f64>,
    hessians: &'a Array2<f64>,
    l2: f64,
}

impl TreeBuilder<'_> {
    /// Best border for `feature` given the current leaf assignment: (bin, gain)
    fn best_border(&self, feature: usize, rows: &[usize], leaf_of: &[usize], n_leaves: usize) -> Option<(usize, f64)> {
        let n_borders = self.binned.borders[feature].len();
        if n_borders == 0 {
            return None;
        }
        let n_classes = self.gradients.ncols();
        let n_bins = n_borders + 1;
        let mut grad_hist = vec![0.0; n_leaves * n_bins * n_classes];
        let mut hess_hist = vec![0.0; n_leaves * n_bins * n_classes];
        for &i in rows {
            let bin = self.binned.bins[feature][i] as usize;
            let base = (leaf_of[i] * n_bins + bin) * n_classes;
            for k in 0..n_classes {
                grad_hist[base + k] += self.gradients[[i, k]];
                hess_hist[base + k] += self.hessians[[i, k]];
            }
        }

        let score = |g: f64, h: f64| g * g / (h + self.l2);
        let mut best: Option<(usize, f64)> = None;
        let mut left_g = vec![0.0; n_leaves * n_classes];
        let mut left_h = vec![0.0; n_leaves * n_classes];
        let mut total_g = vec![0.0; n_leaves * n_classes];
        let mut total_h = vec![0.0; n_leaves * n_classes];
        for leaf in 0..n_leaves {
            for bin in 0..n_bins {
                for k in 0..n_classes {
                    let src = (leaf * n_bins + bin) * n_classes + k;
                    total_g[leaf * n_classes + k] += grad_hist[src];
                    total_h[leaf * n_classes + k] += hess_hist[src];
                }
            }
        }

        // Border `b` sends bins 0..=b left
        for border in 0..n_borders {
            let mut gain = 0.0;
            for leaf in 0..n_leaves {
                for k in 0..n_classes {
                    let slot = leaf * n_classes + k;
                    let src = (leaf * n_bins + border) * n_classes + k;
                    left_g[slot] += grad_hist[src];
                    left_h[slot] += hess_hist[src];
                    let right_g = total_g[slot] - left_g[slot];
                    let right_h = total_h[slot] - left_h[slot];
                    gain += score(left_g[slot], left_h[slot]) + score(right_g, right_h)
                        - score(total_g[slot], total_h[slot]);
                }
            }
            if gain > 1e-12 && best.map_or(true, |(_, g)| gain > g) {
                best = Some((border, gain));
            }
        }
        best
    }

    fn build(&self, rows: &[usize], depth: usize) -> (SymmetricTree, Vec<usize>) {
        let n_samples = self.gradients.nrows();
        let n_classes = self.gradients.ncols();
        let n_features = self.binned.borders.len();
        let mut leaf_of = vec![0usize; n_samples];
        let mut splits = Vec::with_capacity(depth);

        for _level in 0..depth {
            let n_leaves = 1 << splits.len();
            let candidates: Vec<Option<(usize, f64)>> = (0..n_features)
                .into_par_iter()
                .map(|f| self.best_border(f, rows, &leaf_of, n_leaves))
                .collect();

            let mut chosen: Option<(usize, usize, f64)> = None;
            for (f, candidate) in candidates.into_iter().enumerate() {
                if let Some((border, gain)) = candidate {
                    if chosen.map_or(true, |(_, _, g)| gain > g) {
                        chosen = Some((f, border, gain));
                    }
                }
            }
            let Some((feature, border, _)) = chosen else { break };
            let bins = &self.binned.bins[feature];
            for (i, leaf) in leaf_of.iter_mut().enumerate() {
                *leaf = *leaf * 2 + usize::from(bins[i] as usize > border);
            }
            splits.push((feature, self.binned.borders[feature][border]));
        }

        let n_leaves = 1 << splits.len();
        let mut g = vec![vec![0.0; n_classes]; n_leaves];
        let mut h = vec![vec![0.0; n_classes]; n_leaves];
        for &i in rows {
            for k in 0..n_classes {
                g[leaf_of[i]][k] += self.gradients[[i, k]];
                h[leaf_of[i]][k] += self.hessians[[i, k]];
            }
        }
        let leaf_values = g
            .iter()
            .zip(h.iter())
            .map(|(gl, hl)| gl.iter().zip(hl.iter()).map(|(&gk, &hk)| -gk / (hk + self.l2)).collect())
            .collect();

        (SymmetricTree { splits, leaf_values }, leaf_of)
    }
}

// ============ CatBoost Classifier ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatBoostClassifier {
    pub config: CatBoostConfig,
    trees: Vec<SymmetricTree>,
    base_scores: Vec<f64>,
    classes: Vec<f64>,
    n_features: usize,
}

impl CatBoostClassifier {
    pub fn new(config: CatBoostConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_scores: Vec::new(),
            classes: Vec::new(),
            n_features: 0,
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn validate(&self) -> Result<()> {
        let c = &self.config;
        if c.iterations == 0 || c.learning_rate <= 0.0 || c.depth == 0 || c.depth > 16 {
            return Err(QualityError::InvalidConfig(format!(
                "CatBoost needs iterations >= 1, learning_rate > 0 and depth in 1..=16, got {}, {}, {}",
                c.iterations, c.learning_rate, c.depth
            )));
        }
        if !(c.subsample > 0.0 && c.subsample <= 1.0) {
            return Err(QualityError::InvalidConfig(format!("subsample must be in (0, 1], got {}", c.subsample)));
        }
        Ok(())
    }

    fn raw_scores(&self, x: &Array2<f64>) -> Array2<f64> {
        let n_classes = self.classes.len();
        let mut raw = Array2::zeros((x.nrows(), n_classes));
        for i in 0..x.nrows() {
            for k in 0..n_classes {
                raw[[i, k]] = self.base_scores[k];
            }
            for tree in &self.trees {
                let leaf = &tree.leaf_values[tree.leaf_index(x, i)];
                for k in 0..n_classes {
                    raw[[i, k]] += self.config.learning_rate * leaf[k];
                }
            }
        }
        raw
    }
}

impl Estimator for CatBoostClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_xy(x, y)?;
        self.validate()?;
        let n = x.nrows();
        self.classes = unique_classes(y);
        self.n_features = x.ncols();
        let n_classes = self.classes.len();
        if n_classes < 2 {
            return Err(QualityError::Training("CatBoost needs at least two classes".to_string()));
        }

        let mut onehot = Array2::<f64>::zeros((n, n_classes));
        for (i, &label) in y.iter().enumerate() {
            if let Some(k) = class_position(&self.classes, label) {
                onehot[[i, k]] = 1.0;
            }
        }
        self.base_scores = (0..n_classes)
            .map(|k| (onehot.column(k).sum() / n as f64).max(1e-12).ln())
            .collect();

        let binned = Binned::build(x, self.config.border_count);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state.unwrap_or(42));
        let mut raw = Array2::zeros((n, n_classes));
        for mut row in raw.rows_mut() {
            for (k, v) in row.iter_mut().enumerate() {
                *v = self.base_scores[k];
            }
        }

        self.trees.clear();
        for _ in 0..self.config.iterations {
            let proba = softmax_rows(&raw);
            let gradients = &proba - &onehot;
            let hessians = proba.mapv(|p| (p * (1.0 - p)).max(1e-16));

            let rows: Vec<usize> = if self.config.subsample < 1.0 {
                let k = ((n as f64) * self.config.subsample).ceil() as usize;
                let mut sub: Vec<usize> = (0..n).collect();
                sub.shuffle(&mut rng);
                sub.truncate(k.max(1));
                sub
            } else {
                (0..n).collect()
            };

            let builder = TreeBuilder {
                binned: &binned,
                gradients: &gradients,
                hessians: &hessians,
                l2: self.config.l2_leaf_reg,
            };
            let (tree, leaf_of) = builder.build(&rows, self.config.depth);
            for (i, &leaf) in leaf_of.iter().enumerate() {
                for k in 0..n_classes {
                    raw[[i, k]] += self.config.learning_rate * tree.leaf_values[leaf][k];
                }
            }
            self.trees.push(tree);
        }
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?.ok_or(QualityError::ModelNotFitted)?;
        Ok(proba_to_classes(&proba, &self.classes))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        if self.trees.is_empty() {
            return Err(QualityError::ModelNotFitted);
        }
        check_features(x, self.n_features)?;
        Ok(Some(softmax_rows(&self.raw_scores(x))))
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}
