//! Ensemble methods module
//!
//! Stacking (meta-learning) over catalog estimators.

mod stacking;

pub use stacking::{StackingClassifier, StackingConfig, StackingRegressor};
