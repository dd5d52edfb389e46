//! Support Vector Machine classifier
//!
//! Binary machines are trained with SMO (Sequential Minimal Optimization);
//! more than two classes are handled one-vs-rest. The classifier exposes no
//! probability model.

use crate::error::{QualityError, Result};
use super::models::{check_features, check_xy, unique_classes, Estimator};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Maximum number of samples for eager kernel matrix computation.
/// Beyond this, training will return an error to prevent OOM.
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// Kernel function type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KernelType {
    /// Linear kernel: K(x, y) = x · y
    Linear,
    /// Polynomial kernel: K(x, y) = (γ * x · y + r)^d
    Polynomial { degree: usize, gamma: f64, coef0: f64 },
    /// Radial Basis Function (Gaussian): K(x, y) = exp(-γ * ||x - y||²).
    /// `None` picks `1 / (n_features * var(X))` at fit time.
    RBF { gamma: Option<f64> },
}

impl Default for KernelType {
    fn default() -> Self {
        KernelType::RBF { gamma: None }
    }
}

/// SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    /// Kernel function
    pub kernel: KernelType,
    /// Tolerance for stopping criterion
    pub tol: f64,
    /// Maximum number of passes over the data
    pub max_iter: usize,
    /// Random seed
    pub random_state: Option<u64>,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: KernelType::default(),
            tol: 1e-3,
            max_iter: 200,
            random_state: Some(42),
        }
    }
}

/// Kernel with every parameter resolved
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum Kernel {
    Linear,
    Polynomial { degree: i32, gamma: f64, coef0: f64 },
    Rbf { gamma: f64 },
}

impl Kernel {
    fn eval(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match *self {
            Kernel::Linear => a.dot(&b),
            Kernel::Polynomial { degree, gamma, coef0 } => (gamma * a.dot(&b) + coef0).powi(degree),
            Kernel::Rbf { gamma } => {
                let norm_sq: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
                (-gamma * norm_sq).exp()
            }
        }
    }
}

/// A single binary SVM trained for one class vs rest
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinarySVM {
    support_vectors: Array2<f64>,
    /// alpha_i * y_i per support vector
    dual_coef: Array1<f64>,
    bias: f64,
}

impl BinarySVM {
    fn score(&self, kernel: &Kernel, sample: ArrayView1<f64>) -> f64 {
        self.support_vectors
            .rows()
            .into_iter()
            .zip(self.dual_coef.iter())
            .map(|(sv, &coef)| coef * kernel.eval(sv, sample))
            .sum::<f64>()
            + self.bias
    }
}

/// Support Vector Classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMClassifier {
    config: SVMConfig,
    kernel: Option<Kernel>,
    classes: Vec<f64>,
    /// One machine for binary problems, one per class otherwise
    machines: Vec<BinarySVM>,
    n_features: usize,
}

impl Default for SVMClassifier {
    fn default() -> Self {
        Self::new(SVMConfig::default())
    }
}

impl SVMClassifier {
    /// Create a new SVM classifier
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            kernel: None,
            classes: Vec::new(),
            machines: Vec::new(),
            n_features: 0,
        }
    }

    pub fn with_c(mut self, c: f64) -> Self {
        self.config.c = c;
        self
    }

    pub fn with_kernel(mut self, kernel: KernelType) -> Self {
        self.config.kernel = kernel;
        self
    }

    fn resolve_kernel(&self, x: &Array2<f64>) -> Kernel {
        match &self.config.kernel {
            KernelType::Linear => Kernel::Linear,
            KernelType::Polynomial { degree, gamma, coef0 } => Kernel::Polynomial {
                degree: (*degree).min(i32::MAX as usize) as i32,
                gamma: *gamma,
                coef0: *coef0,
            },
            KernelType::RBF { gamma: Some(g) } => Kernel::Rbf { gamma: *g },
            KernelType::RBF { gamma: None } => {
                let variance = x.var(0.0);
                let denom = x.ncols() as f64 * variance;
                Kernel::Rbf { gamma: if denom > 0.0 { 1.0 / denom } else { 1.0 } }
            }
        }
    }

    /// Compute kernel matrix, one row per rayon task
    fn compute_kernel_matrix(kernel: &Kernel, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();
        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| (0..n).map(|j| kernel.eval(x.row(i), x.row(j))).collect())
            .collect();
        let mut k = Array2::zeros((n, n));
        for (i, row) in rows.into_iter().enumerate() {
            for (j, val) in row.into_iter().enumerate() {
                k[[i, j]] = val;
            }
        }
        k
    }

    /// SMO training of one binary machine on `y` in {-1, +1}
    fn smo_train(&self, x: &Array2<f64>, k: &Array2<f64>, y: &Array1<f64>, seed: u64) -> BinarySVM {
        let n = x.nrows();
        let c = self.config.c;
        let tol = self.config.tol;
        let mut alphas = Array1::<f64>::zeros(n);
        let mut bias = 0.0;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);

        let decision = |alphas: &Array1<f64>, bias: f64, idx: usize| -> f64 {
            let mut sum = bias;
            for i in 0..n {
                if alphas[i] != 0.0 {
                    sum += alphas[i] * y[i] * k[[i, idx]];
                }
            }
            sum
        };

        let mut passes = 0;
        let max_passes = 5;
        let mut total_iter = 0;

        while n > 1 && passes < max_passes && total_iter < self.config.max_iter {
            let mut num_changed = 0;
            for i in 0..n {
                let e_i = decision(&alphas, bias, i) - y[i];
                if !((y[i] * e_i < -tol && alphas[i] < c) || (y[i] * e_i > tol && alphas[i] > 0.0)) {
                    continue;
                }
                let j = loop {
                    let j = rng.gen_range(0..n);
                    if j != i {
                        break j;
                    }
                };
                let e_j = decision(&alphas, bias, j) - y[j];
                let alpha_i_old = alphas[i];
                let alpha_j_old = alphas[j];

                let (l, h) = if y[i] != y[j] {
                    ((alpha_j_old - alpha_i_old).max(0.0), (c + alpha_j_old - alpha_i_old).min(c))
                } else {
                    ((alpha_i_old + alpha_j_old - c).max(0.0), (alpha_i_old + alpha_j_old).min(c))
                };
                if (l - h).abs() < 1e-10 {
                    continue;
                }

                let eta = 2.0 * k[[i, j]] - k[[i, i]] - k[[j, j]];
                if eta >= 0.0 {
                    continue;
                }

                alphas[j] = (alpha_j_old - y[j] * (e_i - e_j) / eta).clamp(l, h);
                if (alphas[j] - alpha_j_old).abs() < 1e-5 {
                    continue;
                }
                alphas[i] = alpha_i_old + y[i] * y[j] * (alpha_j_old - alphas[j]);

                let b1 = bias - e_i
                    - y[i] * (alphas[i] - alpha_i_old) * k[[i, i]]
                    - y[j] * (alphas[j] - alpha_j_old) * k[[i, j]];
                let b2 = bias - e_j
                    - y[i] * (alphas[i] - alpha_i_old) * k[[i, j]]
                    - y[j] * (alphas[j] - alpha_j_old) * k[[j, j]];
                bias = if alphas[i] > 0.0 && alphas[i] < c {
                    b1
                } else if alphas[j] > 0.0 && alphas[j] < c {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };
                num_changed += 1;
            }

            total_iter += 1;
            if num_changed == 0 {
                passes += 1;
            } else {
                passes = 0;
            }
        }

        let support: Vec<usize> = (0..n).filter(|&i| alphas[i] > 1e-8).collect();
        let mut support_vectors = Array2::zeros((support.len(), x.ncols()));
        let mut dual_coef = Array1::zeros(support.len());
        for (row, &idx) in support.iter().enumerate() {
            support_vectors.row_mut(row).assign(&x.row(idx));
            dual_coef[row] = alphas[idx] * y[idx];
        }
        BinarySVM { support_vectors, dual_coef, bias }
    }

    /// Fit the classifier (supports binary and multi-class via One-vs-Rest)
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        check_xy(x, y)?;
        if self.config.c <= 0.0 {
            return Err(QualityError::InvalidConfig(format!("SVM C must be positive, got {}", self.config.c)));
        }
        let n = x.nrows();
        if n > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(QualityError::Training(format!(
                "dataset has {} samples, exceeding the maximum {} for the SVM kernel matrix",
                n, MAX_KERNEL_MATRIX_SAMPLES
            )));
        }

        let classes = unique_classes(y);
        if classes.len() < 2 {
            return Err(QualityError::Training("SVM requires at least 2 distinct classes".to_string()));
        }

        let kernel = self.resolve_kernel(x);
        let k = Self::compute_kernel_matrix(&kernel, x);
        let seed = self.config.random_state.unwrap_or(42);

        let positives: Vec<f64> = if classes.len() == 2 { vec![classes[1]] } else { classes.clone() };
        let machines: Vec<BinarySVM> = positives
            .par_iter()
            .enumerate()
            .map(|(m, &positive)| {
                let y_binary = y.mapv(|v| if v == positive { 1.0 } else { -1.0 });
                self.smo_train(x, &k, &y_binary, seed.wrapping_add(m as u64))
            })
            .collect();

        self.kernel = Some(kernel);
        self.classes = classes;
        self.machines = machines;
        self.n_features = x.ncols();
        Ok(self)
    }

    /// Raw decision scores: one column for binary problems, one per class otherwise
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let kernel = self.kernel.as_ref().ok_or(QualityError::ModelNotFitted)?;
        check_features(x, self.n_features)?;
        let mut scores = Array2::zeros((x.nrows(), self.machines.len()));
        for (i, sample) in x.rows().into_iter().enumerate() {
            for (m, machine) in self.machines.iter().enumerate() {
                scores[[i, m]] = machine.score(kernel, sample);
            }
        }
        Ok(scores)
    }

    /// Get number of support vectors
    pub fn n_support_vectors(&self) -> usize {
        self.machines.iter().map(|m| m.support_vectors.nrows()).sum()
    }
}

impl Estimator for SVMClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        SVMClassifier::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scores = self.decision_function(x)?;
        let predictions = scores
            .rows()
            .into_iter()
            .map(|row| {
                if self.machines.len() == 1 {
                    if row[0] >= 0.0 { self.classes[1] } else { self.classes[0] }
                } else {
                    self.classes[super::models::argmax(row)]
                }
            })
            .collect();
        Ok(predictions)
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}
