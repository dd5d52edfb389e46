//! Inference module
//!
//! Serves single-record predictions from a dataset's artifact bundle:
//! - Eager, one-time bundle load shared behind an `Arc`
//! - The fitted preprocessing transform applied to each record
//! - Class probabilities as confidence when the model has them
//! - Label policies for banded and binary datasets

mod service;

pub use service::{InferenceService, Prediction, ServiceStatus, REGRESSION_CONFIDENCE};
