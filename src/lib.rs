//! Beverage quality - training and inference for tabular quality grading
//!
//! This crate trains one classifier per supported dataset (milk, wine and
//! water quality tables) and serves single-record predictions from the
//! persisted artifacts:
//! - Idempotent, seeded train/test splitting
//! - Median imputation, polynomial expansion and standard scaling
//! - Cross-validated model search over a fixed estimator catalog
//! - Version-stamped, hashed artifact bundles
//! - A thread-safe inference service
//!
//! # Modules
//!
//! ## Pipeline
//! - [`dataset`] - Dataset descriptors and label policies
//! - [`ingestion`] - Raw table splitting
//! - [`preprocessing`] - Feature pipeline and label encoding
//! - [`training`] - Estimators, cross-validation and model selection
//! - [`ensemble`] - Stacking ensembles
//! - [`artifacts`] - Artifact bundle persistence
//! - [`inference`] - Single-record prediction service
//! - [`pipeline`] - End-to-end training orchestration
//!
//! ## Diagnostics
//! - [`analysis`] - Duplicate, near-duplicate and leakage checks; augmentation
//!
//! ## Services
//! - [`cli`] - Command-line interface
//! - [`telemetry`] - Logging setup

// Core error handling
pub mod error;
pub mod config;
pub mod telemetry;

// Core ML modules
pub mod dataset;
pub mod ingestion;
pub mod preprocessing;
pub mod training;
pub mod ensemble;
pub mod artifacts;
pub mod inference;
pub mod pipeline;

// Data processing
pub mod analysis;

// Utilities
pub mod utils;

// Services
pub mod cli;

pub use error::{QualityError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ErrorKind, QualityError, Result};

    // Configuration
    pub use crate::config::{PipelineConfig, WineObjective};
    pub use crate::telemetry::{Telemetry, TelemetryConfig};

    // Datasets
    pub use crate::dataset::{DatasetDescriptor, DatasetId, LabelPolicy};

    // Preprocessing
    pub use crate::preprocessing::{FeaturePipeline, FeatureRecord, LabelEncoder};

    // Training
    pub use crate::training::{Catalog, Estimator, ModelSelector, SelectionReport, TrainedModel};

    // Persistence and inference
    pub use crate::artifacts::{ArtifactBundle, ArtifactStore};
    pub use crate::inference::{InferenceService, Prediction};
    pub use crate::pipeline::{TrainingPipeline, TrainingReport};

    // Diagnostics
    pub use crate::analysis::{analyze, augment, AugmentConfig, DataAnalysisReport};
}
