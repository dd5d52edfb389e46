//! Target label encoding

use crate::error::{QualityError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bijection between raw target labels and contiguous class indices.
///
/// Indices are assigned in first-seen order during `fit`. The fitted mapping
/// is closed: an unseen label or an out-of-range index is an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl LabelEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn the mapping from a label column
    pub fn fit<S: AsRef<str>>(&mut self, labels: &[S]) -> Result<&mut Self> {
        if labels.is_empty() {
            return Err(QualityError::Data("cannot fit a label encoder on an empty column".to_string()));
        }
        self.classes.clear();
        self.index.clear();
        for label in labels {
            let label = label.as_ref();
            if !self.index.contains_key(label) {
                self.index.insert(label.to_string(), self.classes.len());
                self.classes.push(label.to_string());
            }
        }
        Ok(self)
    }

    /// Encoder with a known class order
    pub fn from_classes(classes: Vec<String>) -> Result<Self> {
        let mut encoder = Self::new();
        encoder.fit(classes.as_slice())?;
        if encoder.classes.len() != classes.len() {
            return Err(QualityError::Data("duplicate class in label encoder".to_string()));
        }
        Ok(encoder)
    }

    pub fn encode(&self, label: &str) -> Result<usize> {
        self.lookup(label)
            .ok_or_else(|| QualityError::UnknownLabel(format!("`{}` was not seen during fitting", label)))
    }

    /// Encode a whole column as `f64` class indices
    pub fn encode_all<S: AsRef<str>>(&self, labels: &[S]) -> Result<Array1<f64>> {
        labels
            .iter()
            .map(|l| self.encode(l.as_ref()).map(|i| i as f64))
            .collect::<Result<Vec<_>>>()
            .map(Array1::from_vec)
    }

    pub fn decode(&self, index: usize) -> Result<&str> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| {
                QualityError::UnknownLabel(format!(
                    "class index {} outside 0..{}",
                    index,
                    self.classes.len()
                ))
            })
    }

    /// Classes in index order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    fn lookup(&self, label: &str) -> Option<usize> {
        // The index map is not serialized; fall back to a scan after loading
        if self.index.len() == self.classes.len() {
            self.index.get(label).copied()
        } else {
            self.classes.iter().position(|c| c == label)
        }
    }
}
