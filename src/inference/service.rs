//! Single-record inference over a loaded artifact bundle
//!
//! A service is built for one dataset and loads its bundle exactly once.
//! When that load fails the service stays uninitialized and every call to
//! [`InferenceService::predict`] fails without touching the disk again.

use crate::artifacts::{ArtifactBundle, ArtifactStore};
use crate::dataset::DatasetDescriptor;
use crate::error::{QualityError, Result};
use crate::preprocessing::FeatureRecord;
use crate::training::models::argmax;
use crate::training::Estimator;
use crate::utils::format_numeric_label;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Confidence reported on the regression path. It is a fixed placeholder,
/// not a calibrated probability.
pub const REGRESSION_CONFIDENCE: f64 = 0.85;

/// Response to one prediction request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Label after the dataset's label policy
    pub label: String,
    /// Probability of the predicted class, when the model has one
    pub confidence: Option<f64>,
    /// Decoded label before the label policy, e.g. `"1"` or `"6"`
    pub raw_label: String,
}

/// Lifecycle of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Uninitialized,
    Ready,
}

#[derive(Debug, Clone)]
enum State {
    Uninitialized { path: PathBuf, reason: String },
    Ready(Arc<ArtifactBundle>),
}

/// Prediction service for one dataset
#[derive(Debug, Clone)]
pub struct InferenceService {
    descriptor: DatasetDescriptor,
    state: State,
}

impl InferenceService {
    /// Load the dataset's bundle from `store`. A failed load leaves the
    /// service uninitialized rather than returning an error.
    pub fn new(descriptor: DatasetDescriptor, store: &ArtifactStore) -> Self {
        match store.load_bundle(descriptor.id()) {
            Ok(bundle) => Self::ready(descriptor, bundle),
            Err(e) => {
                warn!(dataset = descriptor.name(), error = %e, "Artifact bundle unavailable, service uninitialized");
                let (path, reason) = match e {
                    QualityError::ArtifactLoad { path, reason } => (path, reason),
                    other => (store.manifest_path(descriptor.id()), other.to_string()),
                };
                Self {
                    descriptor,
                    state: State::Uninitialized { path, reason },
                }
            }
        }
    }

    /// Like [`InferenceService::new`] but surfaces the load failure
    pub fn try_new(descriptor: DatasetDescriptor, store: &ArtifactStore) -> Result<Self> {
        let bundle = store.load_bundle(descriptor.id())?;
        Ok(Self::ready(descriptor, bundle))
    }

    /// Serve an in-memory bundle
    pub fn from_bundle(descriptor: DatasetDescriptor, bundle: ArtifactBundle) -> Result<Self> {
        if bundle.dataset != descriptor.id() {
            return Err(QualityError::UnsupportedDataset(format!(
                "bundle for `{}` cannot serve `{}`",
                bundle.dataset, descriptor.id()
            )));
        }
        Ok(Self::ready(descriptor, bundle))
    }

    fn ready(descriptor: DatasetDescriptor, bundle: ArtifactBundle) -> Self {
        info!(
            dataset = descriptor.name(),
            version = bundle.version,
            model = bundle.model.family(),
            "Inference service ready"
        );
        Self {
            descriptor,
            state: State::Ready(Arc::new(bundle)),
        }
    }

    pub fn descriptor(&self) -> &DatasetDescriptor {
        &self.descriptor
    }

    pub fn status(&self) -> ServiceStatus {
        match self.state {
            State::Uninitialized { .. } => ServiceStatus::Uninitialized,
            State::Ready(_) => ServiceStatus::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status() == ServiceStatus::Ready
    }

    /// Version of the loaded bundle
    pub fn bundle_version(&self) -> Option<u64> {
        match &self.state {
            State::Ready(bundle) => Some(bundle.version),
            State::Uninitialized { .. } => None,
        }
    }

    /// Predict the label of one record. Every failure is wrapped in a single
    /// `Prediction` error naming the dataset.
    pub fn predict(&self, record: &FeatureRecord) -> Result<Prediction> {
        let start = Instant::now();
        let result = match &self.state {
            State::Ready(bundle) => self.predict_with(bundle, record),
            State::Uninitialized { path, reason } => Err(QualityError::artifact_load(path.clone(), reason)),
        };

        match result {
            Ok(prediction) => {
                debug!(
                    dataset = self.descriptor.name(),
                    label = %prediction.label,
                    confidence = ?prediction.confidence,
                    latency_us = start.elapsed().as_micros() as u64,
                    "Prediction served"
                );
                Ok(prediction)
            }
            Err(e) => Err(QualityError::Prediction {
                dataset: self.descriptor.name().to_string(),
                source: Box::new(e),
            }),
        }
    }

    fn predict_with(&self, bundle: &ArtifactBundle, record: &FeatureRecord) -> Result<Prediction> {
        let x = bundle.pipeline.transform_record(record)?;
        let policy = self.descriptor.label_policy();

        if bundle.model.is_regressor() {
            let score = bundle
                .model
                .predict(&x)?
                .first()
                .copied()
                .ok_or_else(|| QualityError::Data("model returned no prediction".to_string()))?;
            if !score.is_finite() {
                return Err(QualityError::Data(format!("non-finite regression score {}", score)));
            }
            let raw_label = format_numeric_label(score.round());
            return Ok(Prediction {
                label: policy.apply(&raw_label)?,
                confidence: Some(REGRESSION_CONFIDENCE),
                raw_label,
            });
        }

        let (class_value, confidence) = match bundle.model.predict_proba(&x)? {
            Some(proba) if proba.nrows() > 0 => {
                let row = proba.row(0);
                let best = argmax(row);
                let classes = bundle.model.classes();
                let value = classes.get(best).copied().unwrap_or(best as f64);
                (value, Some(row[best].clamp(0.0, 1.0)))
            }
            _ => {
                let value = bundle
                    .model
                    .predict(&x)?
                    .first()
                    .copied()
                    .ok_or_else(|| QualityError::Data("model returned no prediction".to_string()))?;
                (value, None)
            }
        };

        if !(class_value.is_finite() && class_value >= 0.0) {
            return Err(QualityError::UnknownLabel(format!("class index {}", class_value)));
        }
        let raw_label = bundle.encoder.decode(class_value.round() as usize)?.to_string();
        Ok(Prediction {
            label: policy.apply(&raw_label)?,
            confidence,
            raw_label,
        })
    }
}
