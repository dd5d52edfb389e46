//! Hyperparameter grids
//!
//! A grid maps parameter names to candidate values; expansion yields every
//! combination in a fixed order (keys sorted, last key varying fastest).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One hyperparameter value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    /// Explicit "no limit", e.g. an unbounded tree depth
    None,
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            ParamValue::Int(v) => Some(v as f64),
            ParamValue::Float(v) => Some(v),
            ParamValue::None => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match *self {
            ParamValue::Int(v) if v >= 0 => Some(v as usize),
            ParamValue::Float(v) if v >= 0.0 && v.fract() == 0.0 => Some(v as usize),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::None => write!(f, "None"),
        }
    }
}

/// A concrete parameter assignment
pub type HyperParams = BTreeMap<String, ParamValue>;

/// Read a float parameter, falling back to `default` when absent
pub fn param_f64(params: &HyperParams, name: &str, default: f64) -> f64 {
    params.get(name).and_then(ParamValue::as_f64).unwrap_or(default)
}

/// Read a count parameter, falling back to `default` when absent
pub fn param_usize(params: &HyperParams, name: &str, default: usize) -> usize {
    params.get(name).and_then(ParamValue::as_usize).unwrap_or(default)
}

/// Read an optional limit; an explicit `None` value means "unbounded"
pub fn param_opt_usize(params: &HyperParams, name: &str, default: Option<usize>) -> Option<usize> {
    match params.get(name) {
        Some(ParamValue::None) => None,
        Some(v) => v.as_usize().or(default),
        None => default,
    }
}

/// Render a parameter set as `a=1, b=None`
pub fn describe(params: &HyperParams) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Search space for one candidate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamGrid {
    params: BTreeMap<String, Vec<ParamValue>>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter and its candidate values
    pub fn with(mut self, name: &str, values: Vec<ParamValue>) -> Self {
        self.params.insert(name.to_string(), values);
        self
    }

    /// Number of combinations
    pub fn len(&self) -> usize {
        if self.params.is_empty() {
            return 0;
        }
        self.params.values().map(Vec::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every combination, in odometer order over the sorted keys
    pub fn expand(&self) -> Vec<HyperParams> {
        let mut combos: Vec<HyperParams> = vec![HyperParams::new()];
        for (name, values) in &self.params {
            let mut next = Vec::with_capacity(combos.len() * values.len());
            for combo in &combos {
                for value in values {
                    let mut extended = combo.clone();
                    extended.insert(name.clone(), *value);
                    next.push(extended);
                }
            }
            combos = next;
        }
        if self.params.is_empty() {
            Vec::new()
        } else {
            combos
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_expansion_order() {
        let grid = ParamGrid::new()
            .with("n_estimators", vec![ParamValue::Int(50), ParamValue::Int(100)])
            .with("max_depth", vec![ParamValue::None, ParamValue::Int(10), ParamValue::Int(20)]);
        assert_eq!(grid.len(), 6);
        let combos = grid.expand();
        assert_eq!(combos.len(), 6);
        // "max_depth" sorts first, so "n_estimators" varies fastest
        assert_eq!(combos[0]["max_depth"], ParamValue::None);
        assert_eq!(combos[0]["n_estimators"], ParamValue::Int(50));
        assert_eq!(combos[1]["n_estimators"], ParamValue::Int(100));
        assert_eq!(combos[2]["max_depth"], ParamValue::Int(10));
    }

    #[test]
    fn test_param_accessors() {
        let mut params = HyperParams::new();
        params.insert("C".to_string(), ParamValue::Float(0.1));
        params.insert("max_depth".to_string(), ParamValue::None);
        params.insert("depth".to_string(), ParamValue::Int(4));
        assert_eq!(param_f64(&params, "C", 1.0), 0.1);
        assert_eq!(param_opt_usize(&params, "max_depth", Some(3)), None);
        assert_eq!(param_opt_usize(&params, "missing", Some(3)), Some(3));
        assert_eq!(param_usize(&params, "depth", 6), 4);
        assert_eq!(describe(&params), "C=0.1, depth=4, max_depth=None");
    }

    #[test]
    fn test_empty_grid() {
        assert!(ParamGrid::new().is_empty());
        assert!(ParamGrid::new().expand().is_empty());
    }
}
