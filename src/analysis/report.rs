//! Duplicate and leakage checks on a raw table

use crate::error::{QualityError, Result};
use crate::utils::column_f64;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::info;

/// Absolute Pearson correlation above which a feature is flagged as leaking
pub const LEAKAGE_THRESHOLD: f64 = 0.95;

/// Findings of [`analyze`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataAnalysisReport {
    pub rows: usize,
    pub columns: usize,
    /// Rows that exactly repeat an earlier row
    pub duplicate_rows: usize,
    /// Groups of rows with identical features but more than one target value
    pub conflicting_near_duplicates: usize,
    /// Features with `|pearson(feature, target)|` above the threshold
    pub leakage_features: Vec<String>,
    /// Set when the correlation check was skipped
    pub note: Option<String>,
}

/// Inspect `df` for exact duplicates, conflicting near-duplicates and target
/// leakage. The leakage check only runs for a numeric target.
pub fn analyze(df: &DataFrame, target: &str) -> Result<DataAnalysisReport> {
    let names: Vec<String> = df.get_column_names().iter().map(|n| n.to_string()).collect();
    if !names.iter().any(|n| n == target) {
        return Err(QualityError::Schema(format!("missing target column `{}`", target)));
    }

    let cells = string_cells(df)?;
    let target_idx = names.iter().position(|n| n == target).unwrap_or_default();

    let mut seen = HashSet::new();
    let mut duplicate_rows = 0;
    let mut targets_by_features: BTreeMap<Vec<Option<String>>, (usize, BTreeSet<Option<String>>)> = BTreeMap::new();

    for row in 0..df.height() {
        let full: Vec<Option<String>> = cells.iter().map(|c| c[row].clone()).collect();
        if !seen.insert(full.clone()) {
            duplicate_rows += 1;
        }

        let mut features = full;
        let target_value = features.remove(target_idx);
        let entry = targets_by_features.entry(features).or_insert_with(|| (0, BTreeSet::new()));
        entry.0 += 1;
        entry.1.insert(target_value);
    }

    let conflicting_near_duplicates = targets_by_features
        .values()
        .filter(|(count, targets)| *count > 1 && targets.len() > 1)
        .count();

    let (leakage_features, note) = if is_numeric(df.column(target)?.dtype()) {
        let y = column_f64(df, target)?;
        let mut flagged = Vec::new();
        for name in names.iter().filter(|n| n.as_str() != target) {
            if !is_numeric(df.column(name)?.dtype()) {
                continue;
            }
            let x = column_f64(df, name)?;
            if let Some(r) = pearson(&x, &y) {
                if r.abs() > LEAKAGE_THRESHOLD {
                    flagged.push(name.clone());
                }
            }
        }
        (flagged, None)
    } else {
        (
            Vec::new(),
            Some("target column is non-numeric; correlation check skipped".to_string()),
        )
    };

    let report = DataAnalysisReport {
        rows: df.height(),
        columns: df.width(),
        duplicate_rows,
        conflicting_near_duplicates,
        leakage_features,
        note,
    };
    info!(
        rows = report.rows,
        duplicates = report.duplicate_rows,
        near_duplicates = report.conflicting_near_duplicates,
        leakage = report.leakage_features.len(),
        "Data analysis complete"
    );
    Ok(report)
}

/// Every column rendered as optional strings, so rows can be compared and
/// hashed regardless of dtype
pub(crate) fn string_cells(df: &DataFrame) -> Result<Vec<Vec<Option<String>>>> {
    df.get_columns()
        .iter()
        .map(|column| {
            let rendered = column.cast(&DataType::String)?;
            let values = rendered
                .str()?
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect();
            Ok(values)
        })
        .collect()
}

pub(crate) fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float32
            | DataType::Float64
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// Pearson correlation over the pairs where both values are finite
fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        cov += (a - mean_x) * (b - mean_y);
        var_x += (a - mean_x).powi(2);
        var_y += (b - mean_y).powi(2);
    }
    let denom = (var_x * var_y).sqrt();
    (denom > 0.0).then(|| cov / denom)
}
