//! Feature preprocessing pipeline

use super::imputer::MedianImputer;
use super::polynomial::PolynomialFeatures;
use super::record::FeatureRecord;
use super::scaler::StandardScaler;
use crate::dataset::DatasetDescriptor;
use crate::error::{QualityError, Result};
use crate::utils::columns_to_array2;
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Median imputation, optional degree-2 expansion, then standard scaling,
/// over a fixed list of numeric columns.
///
/// Once fitted, `transform` depends only on the fitted state and its input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturePipeline {
    features: Vec<String>,
    imputer: MedianImputer,
    polynomial: Option<PolynomialFeatures>,
    scaler: StandardScaler,
    is_fitted: bool,
    /// Timing: seconds spent in the last fit call
    fit_time: Option<f64>,
}

impl FeaturePipeline {
    /// Create an unfitted pipeline over `features`
    pub fn new(features: Vec<String>, polynomial: bool) -> Self {
        Self {
            features,
            imputer: MedianImputer::new(),
            polynomial: polynomial.then(PolynomialFeatures::new),
            scaler: StandardScaler::new(),
            is_fitted: false,
            fit_time: None,
        }
    }

    /// Unfitted pipeline over a dataset's declared features
    pub fn for_dataset(descriptor: &DatasetDescriptor) -> Self {
        Self::new(descriptor.features().to_vec(), descriptor.polynomial())
    }

    /// Fit on a table's feature columns
    pub fn fit(&mut self, df: &DataFrame) -> Result<&mut Self> {
        let x = self.extract(df)?;
        self.fit_matrix(&x)?;
        Ok(self)
    }

    /// Fit and return the transformed training matrix
    pub fn fit_transform(&mut self, df: &DataFrame) -> Result<Array2<f64>> {
        let x = self.extract(df)?;
        self.fit_matrix(&x)
    }

    /// Fit on a raw feature matrix whose columns follow the declared order
    pub fn fit_matrix(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let start = Instant::now();
        self.check_width(x)?;
        if x.nrows() == 0 {
            return Err(QualityError::Data("cannot fit preprocessing on zero rows".to_string()));
        }

        let imputed = self.imputer.fit(x)?.transform(x)?;
        let expanded = match self.polynomial.as_mut() {
            Some(poly) => poly.fit(&imputed)?.transform(&imputed)?,
            None => imputed,
        };
        let scaled = self.scaler.fit_transform(&expanded)?;

        self.is_fitted = true;
        self.fit_time = Some(start.elapsed().as_secs_f64());
        debug!(
            rows = x.nrows(),
            inputs = self.features.len(),
            outputs = scaled.ncols(),
            "Preprocessing fitted"
        );
        Ok(scaled)
    }

    /// Transform a table using the fitted statistics
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        let x = self.extract(df)?;
        self.transform_matrix(&x)
    }

    /// Transform one feature record; missing or extra keys are schema errors
    pub fn transform_record(&self, record: &FeatureRecord) -> Result<Array2<f64>> {
        let row = record.to_row(&self.features)?;
        self.transform_matrix(&row)
    }

    /// Transform a raw feature matrix whose columns follow the declared order
    pub fn transform_matrix(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(QualityError::ModelNotFitted);
        }
        self.check_width(x)?;
        let imputed = self.imputer.transform(x)?;
        let expanded = match &self.polynomial {
            Some(poly) => poly.transform(&imputed)?,
            None => imputed,
        };
        self.scaler.transform(&expanded)
    }

    /// Input feature names, in declared order
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Names of the transformed columns
    pub fn output_feature_names(&self) -> Vec<String> {
        match &self.polynomial {
            Some(poly) if self.is_fitted => poly.feature_names(&self.features),
            _ => self.features.clone(),
        }
    }

    pub fn n_output_features(&self) -> usize {
        self.output_feature_names().len()
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    pub fn fit_time(&self) -> Option<f64> {
        self.fit_time
    }

    pub fn imputer(&self) -> &MedianImputer {
        &self.imputer
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    /// Pipeline with known statistics: per-input medians and per-output
    /// scaling, the polynomial step fitted for the input width
    pub fn from_parameters(
        features: Vec<String>,
        polynomial: bool,
        medians: Vec<f64>,
        scaler: StandardScaler,
    ) -> Result<Self> {
        let mut pipeline = Self::new(features, polynomial);
        let seed = Array2::from_shape_vec((1, medians.len()), medians)?;
        pipeline.check_width(&seed)?;
        pipeline.imputer.fit(&seed)?;
        let expanded = match pipeline.polynomial.as_mut() {
            Some(poly) => poly.fit(&seed)?.n_output_features(),
            None => seed.ncols(),
        };
        if scaler.mean().len() != expanded {
            return Err(QualityError::ShapeMismatch {
                expected: format!("{} scaled columns", expanded),
                actual: format!("{} scaled columns", scaler.mean().len()),
            });
        }
        pipeline.scaler = scaler;
        pipeline.is_fitted = true;
        Ok(pipeline)
    }

    fn extract(&self, df: &DataFrame) -> Result<Array2<f64>> {
        let missing: Vec<&str> = self
            .features
            .iter()
            .filter(|f| df.column(f.as_str()).is_err())
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(QualityError::Schema(format!("missing feature columns: {}", missing.join(", "))));
        }
        columns_to_array2(df, &self.features)
    }

    fn check_width(&self, x: &Array2<f64>) -> Result<()> {
        if x.ncols() != self.features.len() {
            return Err(QualityError::Schema(format!(
                "expected {} feature columns, got {}",
                self.features.len(),
                x.ncols()
            )));
        }
        Ok(())
    }
}
