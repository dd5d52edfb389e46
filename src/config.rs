//! Pipeline configuration

use crate::error::{QualityError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the wine model is trained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WineObjective {
    /// Classify raw quality scores, then band the decoded score
    Classification,
    /// Regress the quality score, round it, then band it
    Regression,
}

impl Default for WineObjective {
    fn default() -> Self {
        WineObjective::Classification
    }
}

/// Configuration for one training or serving run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the raw `<dataset>.csv` files
    pub data_dir: PathBuf,

    /// Directory receiving the raw/train/test split files
    pub split_dir: PathBuf,

    /// Directory receiving the artifact bundles and training reports
    pub artifact_dir: PathBuf,

    /// Seed for splitting, model randomness and best-of-N iterations
    pub seed: u64,

    /// Fraction of rows held out as the test split
    pub test_ratio: f64,

    /// Folds for candidates that run a grid search
    pub grid_cv_folds: usize,

    /// Folds for candidates without a grid
    pub plain_cv_folds: usize,

    pub wine_objective: WineObjective,

    /// Upper bound on best-of-N refits for wine
    pub wine_max_iterations: usize,

    /// Held-out accuracy at which the best-of-N search stops early
    pub wine_target_accuracy: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("Dataset"),
            split_dir: PathBuf::from("data"),
            artifact_dir: PathBuf::from("artifact"),
            seed: 42,
            test_ratio: 0.2,
            grid_cv_folds: 3,
            plain_cv_folds: 5,
            wine_objective: WineObjective::Classification,
            wine_max_iterations: 10,
            wine_target_accuracy: 0.70,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file; absent keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            QualityError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_split_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.split_dir = dir.into();
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    /// Builder method to set the seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_test_ratio(mut self, ratio: f64) -> Self {
        self.test_ratio = ratio;
        self
    }

    /// Builder method to set both cross-validation fold counts
    pub fn with_cv_folds(mut self, grid: usize, plain: usize) -> Self {
        self.grid_cv_folds = grid;
        self.plain_cv_folds = plain;
        self
    }

    pub fn with_wine_objective(mut self, objective: WineObjective) -> Self {
        self.wine_objective = objective;
        self
    }

    /// Builder method to configure the wine best-of-N search
    pub fn with_wine_search(mut self, max_iterations: usize, target_accuracy: f64) -> Self {
        self.wine_max_iterations = max_iterations;
        self.wine_target_accuracy = target_accuracy;
        self
    }

    /// Reject settings no run could use
    pub fn validate(&self) -> Result<()> {
        if !(self.test_ratio > 0.0 && self.test_ratio < 1.0) {
            return Err(QualityError::InvalidConfig(format!(
                "test_ratio must be in (0, 1), got {}",
                self.test_ratio
            )));
        }
        if self.grid_cv_folds < 2 || self.plain_cv_folds < 2 {
            return Err(QualityError::InvalidConfig(format!(
                "cross-validation needs at least 2 folds, got grid={} plain={}",
                self.grid_cv_folds, self.plain_cv_folds
            )));
        }
        if self.wine_max_iterations == 0 {
            return Err(QualityError::InvalidConfig(
                "wine_max_iterations must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.wine_target_accuracy) {
            return Err(QualityError::InvalidConfig(format!(
                "wine_target_accuracy must be in [0, 1], got {}",
                self.wine_target_accuracy
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.seed, 42);
        assert_eq!(config.grid_cv_folds, 3);
        assert_eq!(config.plain_cv_folds, 5);
        assert_eq!(config.wine_objective, WineObjective::Classification);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = PipelineConfig::new()
            .with_seed(7)
            .with_test_ratio(0.25)
            .with_wine_objective(WineObjective::Regression)
            .with_wine_search(3, 0.9);
        assert_eq!(config.seed, 7);
        assert_eq!(config.test_ratio, 0.25);
        assert_eq!(config.wine_max_iterations, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(PipelineConfig::new().with_test_ratio(1.0).validate().is_err());
        assert!(PipelineConfig::new().with_cv_folds(1, 5).validate().is_err());
        assert!(PipelineConfig::new().with_wine_search(0, 0.7).validate().is_err());
    }

    #[test]
    fn test_from_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"seed": 9, "wine_objective": "Regression"}"#).unwrap();
        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.seed, 9);
        assert_eq!(config.wine_objective, WineObjective::Regression);
        assert_eq!(config.plain_cv_folds, 5);
    }
}
