//! Degree-2 polynomial feature expansion

use crate::error::{QualityError, Result};
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

/// Appends every pairwise product and square to the original features,
/// without a bias column. Terms follow lexicographic combination order:
/// `x0*x0, x0*x1, .., x0*xn, x1*x1, ..`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolynomialFeatures {
    n_input_features: usize,
    terms: Vec<(usize, usize)>,
    is_fitted: bool,
}

impl PolynomialFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        let n = x.ncols();
        self.n_input_features = n;
        self.terms = (0..n).flat_map(|i| (i..n).map(move |j| (i, j))).collect();
        self.is_fitted = true;
        Ok(self)
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(QualityError::ModelNotFitted);
        }
        if x.ncols() != self.n_input_features {
            return Err(QualityError::ShapeMismatch {
                expected: format!("{} columns", self.n_input_features),
                actual: format!("{} columns", x.ncols()),
            });
        }
        let n = self.n_input_features;
        let mut out = Array2::zeros((x.nrows(), self.n_output_features()));
        out.slice_mut(s![.., ..n]).assign(x);
        for (k, &(i, j)) in self.terms.iter().enumerate() {
            let product = &x.column(i) * &x.column(j);
            out.column_mut(n + k).assign(&product);
        }
        Ok(out)
    }

    pub fn n_output_features(&self) -> usize {
        self.n_input_features + self.terms.len()
    }

    /// Output names in column order, e.g. `pH`, `pH^2`, `pH Fat`
    pub fn feature_names(&self, input: &[String]) -> Vec<String> {
        let mut names = input.to_vec();
        names.extend(self.terms.iter().map(|&(i, j)| {
            if i == j {
                format!("{}^2", input[i])
            } else {
                format!("{} {}", input[i], input[j])
            }
        }));
        names
    }
}
