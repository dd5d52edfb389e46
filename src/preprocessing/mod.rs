//! Data preprocessing module
//!
//! Provides the per-dataset feature pipeline and target encoding:
//! - Median imputation of missing values
//! - Degree-2 polynomial expansion
//! - Standard scaling
//! - Label encoding of the target column
//! - Single-record input for inference

mod encoder;
mod imputer;
mod pipeline;
mod polynomial;
mod record;
mod scaler;

pub use encoder::LabelEncoder;
pub use imputer::MedianImputer;
pub use pipeline::FeaturePipeline;
pub use polynomial::PolynomialFeatures;
pub use record::FeatureRecord;
pub use scaler::StandardScaler;
