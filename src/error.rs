//! Error types for the beverage quality pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, QualityError>;

/// Coarse classification of a [`QualityError`], stable across message changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Schema,
    Ingestion,
    NoViableModel,
    ArtifactLoad,
    UnsupportedDataset,
    Prediction,
    Internal,
}

/// A candidate that was excluded from model selection
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CandidateFailure {
    pub candidate: String,
    pub reason: String,
}

impl std::fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.candidate, self.reason)
    }
}

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum QualityError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Ingestion error: {message}")]
    Ingestion {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("No viable model: all {} candidates failed", failures.len())]
    NoViableModel { failures: Vec<CandidateFailure> },

    #[error("Artifact load error at {}: {reason}", path.display())]
    ArtifactLoad { path: PathBuf, reason: String },

    #[error("Unsupported dataset: {0}")]
    UnsupportedDataset(String),

    #[error("Prediction failed for {dataset}: {source}")]
    Prediction {
        dataset: String,
        #[source]
        source: Box<QualityError>,
    },

    #[error("Unknown label: {0}")]
    UnknownLabel(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Data error: {0}")]
    Data(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl QualityError {
    /// Build an ingestion error that keeps the underlying failure as its source
    pub fn ingestion<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        QualityError::Ingestion {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn artifact_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        QualityError::ArtifactLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// The kind of this error as seen by callers of the pipeline
    pub fn kind(&self) -> ErrorKind {
        match self {
            QualityError::Schema(_) => ErrorKind::Schema,
            QualityError::Ingestion { .. } => ErrorKind::Ingestion,
            QualityError::NoViableModel { .. } => ErrorKind::NoViableModel,
            QualityError::ArtifactLoad { .. } => ErrorKind::ArtifactLoad,
            QualityError::UnsupportedDataset(_) => ErrorKind::UnsupportedDataset,
            QualityError::Prediction { .. } => ErrorKind::Prediction,
            _ => ErrorKind::Internal,
        }
    }

    /// The innermost error, looking through prediction wrapping
    pub fn root(&self) -> &QualityError {
        match self {
            QualityError::Prediction { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<polars::error::PolarsError> for QualityError {
    fn from(err: polars::error::PolarsError) -> Self {
        QualityError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for QualityError {
    fn from(err: serde_json::Error) -> Self {
        QualityError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for QualityError {
    fn from(err: bincode::Error) -> Self {
        QualityError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for QualityError {
    fn from(err: ndarray::ShapeError) -> Self {
        QualityError::ShapeMismatch {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
