//! Missing value imputation

use crate::error::{QualityError, Result};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Replaces missing (`NaN`) cells with the per-column median of the fitting data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedianImputer {
    medians: Vec<f64>,
    is_fitted: bool,
}

impl MedianImputer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit the imputer to the data
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        self.medians = x
            .axis_iter(Axis(1))
            .map(|column| {
                let present: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
                // An all-missing column imputes to zero
                median(present).unwrap_or(0.0)
            })
            .collect();
        self.is_fitted = true;
        Ok(self)
    }

    /// Fill missing cells with the fitted medians
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(QualityError::ModelNotFitted);
        }
        if x.ncols() != self.medians.len() {
            return Err(QualityError::ShapeMismatch {
                expected: format!("{} columns", self.medians.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        let mut out = x.clone();
        for (mut column, &fill) in out.axis_iter_mut(Axis(1)).zip(self.medians.iter()) {
            column.mapv_inplace(|v| if v.is_nan() { fill } else { v });
        }
        Ok(out)
    }

    pub fn medians(&self) -> &[f64] {
        &self.medians
    }
}

/// Median of a sample; the mean of the two middle values for even sizes
fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
