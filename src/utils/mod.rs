//! Utility functions and types

pub mod data_loader;

pub use data_loader::{column_f64, column_labels, columns_to_array2, format_numeric_label, DataLoader, DataSaver};
