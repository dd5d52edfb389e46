//! Noisy replication of a small table

use super::report::{is_numeric, string_cells};
use crate::error::{QualityError, Result};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

/// Augmentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentConfig {
    /// Rows in the output table
    pub target_rows: usize,
    /// Noise standard deviation as a fraction of each column's std
    pub noise_level: f64,
    pub seed: u64,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            target_rows: 1000,
            noise_level: 0.1,
            seed: 42,
        }
    }
}

impl AugmentConfig {
    pub fn with_target_rows(mut self, rows: usize) -> Self {
        self.target_rows = rows;
        self
    }

    pub fn with_noise_level(mut self, level: f64) -> Self {
        self.noise_level = level;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Grow `df` to `target_rows` rows: the distinct rows are repeated whole as
/// often as they fit, the remainder is drawn without replacement, then
/// Gaussian noise is added to every numeric column except `target` and the
/// result is rounded to three decimals.
pub fn augment(df: &DataFrame, target: &str, config: &AugmentConfig) -> Result<DataFrame> {
    if !(config.noise_level >= 0.0 && config.noise_level.is_finite()) {
        return Err(QualityError::InvalidConfig(format!(
            "noise_level must be a non-negative number, got {}",
            config.noise_level
        )));
    }
    if df.column(target).is_err() {
        return Err(QualityError::Schema(format!("missing target column `{}`", target)));
    }

    let unique = unique_row_indices(df)?;
    if unique.is_empty() {
        return Err(QualityError::Data("no rows to augment".to_string()));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let reps = config.target_rows / unique.len();
    let remainder = config.target_rows % unique.len();

    let mut indices: Vec<IdxSize> = Vec::with_capacity(config.target_rows);
    for _ in 0..reps {
        indices.extend(unique.iter().map(|&i| i as IdxSize));
    }
    indices.extend(
        unique
            .choose_multiple(&mut rng, remainder)
            .map(|&i| i as IdxSize),
    );

    let mut out = df.take(&IdxCa::from_vec("idx".into(), indices))?;

    let numeric: Vec<String> = out
        .get_columns()
        .iter()
        .filter(|c| c.name().as_str() != target && is_numeric(c.dtype()))
        .map(|c| c.name().to_string())
        .collect();

    for name in &numeric {
        let values: Vec<Option<f64>> = out.column(name)?.cast(&DataType::Float64)?.f64()?.into_iter().collect();
        let std = sample_std(&values);
        let noise = Normal::new(0.0, config.noise_level * std)
            .map_err(|e| QualityError::Data(format!("noise for `{}`: {}", name, e)))?;
        let noisy: Vec<Option<f64>> = values
            .into_iter()
            .map(|v| v.map(|x| round3(x + noise.sample(&mut rng))))
            .collect();
        out.with_column(Series::new(name.as_str().into(), noisy))?;
    }

    info!(
        source_rows = df.height(),
        unique_rows = unique.len(),
        output_rows = out.height(),
        noisy_columns = numeric.len(),
        "Dataset augmented"
    );
    Ok(out)
}

/// Index of the first occurrence of each distinct row, in table order
fn unique_row_indices(df: &DataFrame) -> Result<Vec<usize>> {
    let cells = string_cells(df)?;
    let mut seen = HashSet::new();
    Ok((0..df.height())
        .filter(|&row| seen.insert(cells.iter().map(|c| c[row].clone()).collect::<Vec<_>>()))
        .collect())
}

/// Sample standard deviation (ddof 1) of the non-null values; zero when it is
/// undefined
fn sample_std(values: &[Option<f64>]) -> f64 {
    let present: Vec<f64> = values.iter().flatten().copied().filter(|v| v.is_finite()).collect();
    if present.len() < 2 {
        return 0.0;
    }
    let n = present.len() as f64;
    let mean = present.iter().sum::<f64>() / n;
    (present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}
