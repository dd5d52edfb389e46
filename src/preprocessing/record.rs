//! Single-row feature records for inference

use crate::error::{QualityError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from feature name to value for one prediction request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    values: BTreeMap<String, f64>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to add one feature
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    /// Parse `name=value` pairs, e.g. from the command line
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut record = Self::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (name, raw) = pair
                .split_once('=')
                .ok_or_else(|| QualityError::Schema(format!("expected name=value, got `{}`", pair)))?;
            record.insert(name.trim(), parse_value(name.trim(), raw)?);
        }
        Ok(record)
    }

    /// Parse a flat JSON object whose values are numbers or numeric strings
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_json_value(&value)
    }

    pub fn from_json_value(value: &serde_json::Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| QualityError::Schema("feature record must be a JSON object".to_string()))?;
        let mut record = Self::new();
        for (name, v) in object {
            let number = match v {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::String(s) => Some(parse_value(name, s)?),
                _ => None,
            }
            .ok_or_else(|| QualityError::Schema(format!("feature `{}` is not numeric: {}", name, v)))?;
            record.insert(name.trim(), number);
        }
        Ok(record)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Check the record carries exactly `features`, no more and no less
    pub fn validate(&self, features: &[String]) -> Result<()> {
        let missing: Vec<&str> = features
            .iter()
            .filter(|f| !self.values.contains_key(f.as_str()))
            .map(String::as_str)
            .collect();
        let extra: Vec<&str> = self
            .names()
            .filter(|n| !features.iter().any(|f| f.as_str() == *n))
            .collect();

        match (missing.is_empty(), extra.is_empty()) {
            (true, true) => Ok(()),
            (false, true) => Err(QualityError::Schema(format!("missing features: {}", missing.join(", ")))),
            (true, false) => Err(QualityError::Schema(format!("unexpected features: {}", extra.join(", ")))),
            (false, false) => Err(QualityError::Schema(format!(
                "missing features: {}; unexpected features: {}",
                missing.join(", "),
                extra.join(", ")
            ))),
        }
    }

    /// One-row matrix in the order of `features`
    pub fn to_row(&self, features: &[String]) -> Result<Array2<f64>> {
        self.validate(features)?;
        let row: Vec<f64> = features
            .iter()
            .map(|f| self.values.get(f).copied().unwrap_or(f64::NAN))
            .collect();
        Ok(Array2::from_shape_vec((1, features.len()), row)?)
    }
}

fn parse_value(name: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| QualityError::Schema(format!("feature `{}` is not numeric: `{}`", name, raw.trim())))
}
