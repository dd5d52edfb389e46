//! Feature scaling

use crate::error::{QualityError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Standard scaling (z-score normalization): (x - mean) / std.
///
/// The standard deviation is the population one; a zero-variance column is
/// scaled by 1.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
    is_fitted: bool,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit the scaler to the data
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        if x.nrows() == 0 {
            return Err(QualityError::Data("cannot fit a scaler on zero rows".to_string()));
        }
        let mean = x.mean_axis(Axis(0)).ok_or(QualityError::ModelNotFitted)?;
        let std = x.std_axis(Axis(0), 0.0);
        self.scale = std.mapv(|s| if s == 0.0 || !s.is_finite() { 1.0 } else { s });
        self.mean = mean;
        self.is_fitted = true;
        Ok(self)
    }

    /// Transform the data
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(QualityError::ModelNotFitted);
        }
        if x.ncols() != self.mean.len() {
            return Err(QualityError::ShapeMismatch {
                expected: format!("{} columns", self.mean.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        Ok((x - &self.mean) / &self.scale)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Map scaled values back to the original units
    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(QualityError::ModelNotFitted);
        }
        Ok(x * &self.scale + &self.mean)
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    /// Scaler with known statistics
    pub fn from_parameters(mean: Array1<f64>, scale: Array1<f64>) -> Result<Self> {
        if mean.len() != scale.len() {
            return Err(QualityError::ShapeMismatch {
                expected: format!("{} scale entries", mean.len()),
                actual: format!("{} scale entries", scale.len()),
            });
        }
        Ok(Self {
            mean,
            scale: scale.mapv(|s| if s == 0.0 { 1.0 } else { s }),
            is_fitted: true,
        })
    }
}
