//! Data loading utilities

use crate::error::{QualityError, Result};
use ndarray::Array2;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;

/// CSV loader for the raw and split tables
#[derive(Debug, Clone)]
pub struct DataLoader {
    /// Rows scanned for schema inference; `None` scans the whole file
    infer_schema_length: Option<usize>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self { infer_schema_length: None }
    }

    pub fn with_infer_schema_length(mut self, rows: usize) -> Self {
        self.infer_schema_length = Some(rows);
        self
    }

    /// Load a CSV file with a header row; header names are trimmed
    pub fn load_csv(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path)
            .map_err(|e| QualityError::ingestion(format!("cannot open {}", path.display()), e))?;

        let mut df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| QualityError::ingestion(format!("cannot parse {}", path.display()), e))?;

        trim_column_names(&mut df)?;
        Ok(df)
    }
}

/// Strip surrounding whitespace from every column name
pub fn trim_column_names(df: &mut DataFrame) -> Result<()> {
    let trimmed: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.trim().to_string())
        .collect();
    df.set_column_names(trimmed)?;
    Ok(())
}

/// CSV writer
pub struct DataSaver;

impl DataSaver {
    /// Save to CSV with a header row
    pub fn save_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(df)?;
        Ok(())
    }
}

/// Values of a column as `f64`. Nulls and cells that do not parse as numbers
/// become `NaN`.
pub fn column_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df
        .column(name)
        .map_err(|_| QualityError::Schema(format!("missing column `{}`", name)))?;
    let values = column.cast(&DataType::Float64)?;
    Ok(values
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

/// Extract named columns into a row-major matrix with `NaN` for missing cells
pub fn columns_to_array2(df: &DataFrame, names: &[String]) -> Result<Array2<f64>> {
    let columns: Vec<Vec<f64>> = names
        .iter()
        .map(|name| column_f64(df, name))
        .collect::<Result<_>>()?;
    Ok(Array2::from_shape_fn((df.height(), names.len()), |(r, c)| columns[c][r]))
}

/// Values of a label column as strings. Whole-number floats print without a
/// fractional part so that `6.0` and `6` name the same class.
pub fn column_labels(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let column = df
        .column(name)
        .map_err(|_| QualityError::Schema(format!("missing target column `{}`", name)))?;

    let labels: Vec<Option<String>> = match column.dtype() {
        DataType::String => column
            .str()?
            .into_iter()
            .map(|v| v.map(|s| s.trim().to_string()))
            .collect(),
        _ => {
            let numeric = column.cast(&DataType::Float64)?;
            let labels: Vec<Option<String>> = numeric
                .f64()?
                .into_iter()
                .map(|v| v.map(format_numeric_label))
                .collect();
            labels
        }
    };

    labels
        .into_iter()
        .enumerate()
        .map(|(row, label)| {
            label
                .filter(|l| !l.is_empty())
                .ok_or_else(|| QualityError::Data(format!("missing `{}` value in row {}", name, row)))
        })
        .collect()
}

/// Render a numeric label the way it appears in the source table
pub fn format_numeric_label(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
