//! Raw table diagnostics and augmentation

mod augment;
mod report;

pub use augment::{augment, AugmentConfig};
pub use report::{analyze, DataAnalysisReport, LEAKAGE_THRESHOLD};
