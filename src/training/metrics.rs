//! Held-out classification metrics

use crate::utils::format_numeric_label;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fraction of positions where prediction and truth agree
pub fn accuracy_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| (*t - *p).abs() < 0.5)
        .count();
    correct as f64 / y_true.len() as f64
}

/// Confusion matrix with rows = true label, columns = predicted label.
/// Values not present in `labels` are skipped.
pub fn confusion_matrix(y_true: &Array1<f64>, y_pred: &Array1<f64>, labels: &[f64]) -> Vec<Vec<usize>> {
    let position = |v: f64| labels.iter().position(|&l| (l - v).abs() < 0.5);
    let mut matrix = vec![vec![0usize; labels.len()]; labels.len()];
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        if let (Some(i), Some(j)) = (position(t), position(p)) {
            matrix[i][j] += 1;
        }
    }
    matrix
}

/// Per-class precision/recall/F1/support
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassScores {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Text-renderable classification report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassScores>,
    pub accuracy: f64,
    pub macro_avg: ClassScores,
    pub weighted_avg: ClassScores,
}

impl ClassificationReport {
    /// Build the report from a confusion matrix and the display name of each class
    pub fn from_confusion(matrix: &[Vec<usize>], names: &[String]) -> Self {
        let n = matrix.len();
        let total: usize = matrix.iter().map(|r| r.iter().sum::<usize>()).sum();
        let correct: usize = (0..n).map(|i| matrix[i][i]).sum();

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let classes: Vec<ClassScores> = (0..n)
            .map(|i| {
                let tp = matrix[i][i];
                let predicted: usize = (0..n).map(|r| matrix[r][i]).sum();
                let support: usize = matrix[i].iter().sum();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1_score = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassScores {
                    label: names.get(i).cloned().unwrap_or_else(|| i.to_string()),
                    precision,
                    recall,
                    f1_score,
                    support,
                }
            })
            .collect();

        let average = |label: &str, weight: &dyn Fn(&ClassScores) -> f64| {
            let w_total: f64 = classes.iter().map(weight).sum();
            let mean = |f: &dyn Fn(&ClassScores) -> f64| {
                if w_total == 0.0 {
                    0.0
                } else {
                    classes.iter().map(|c| f(c) * weight(c)).sum::<f64>() / w_total
                }
            };
            ClassScores {
                label: label.to_string(),
                precision: mean(&|c: &ClassScores| c.precision),
                recall: mean(&|c: &ClassScores| c.recall),
                f1_score: mean(&|c: &ClassScores| c.f1_score),
                support: total,
            }
        };
        let macro_avg = average("macro avg", &|_: &ClassScores| 1.0);
        let weighted_avg = average("weighted avg", &|c: &ClassScores| c.support as f64);

        Self {
            classes,
            accuracy: ratio(correct, total),
            macro_avg,
            weighted_avg,
        }
    }

    /// Support-weighted F1 across classes
    pub fn weighted_f1(&self) -> f64 {
        self.weighted_avg.f1_score
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.label.len())
            .chain(std::iter::once("weighted avg".len()))
            .max()
            .unwrap_or(12);
        writeln!(f, "{:>width$} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support")?;
        writeln!(f)?;
        let row = |f: &mut fmt::Formatter<'_>, c: &ClassScores| {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.label, c.precision, c.recall, c.f1_score, c.support
            )
        };
        for c in &self.classes {
            row(f, c)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.weighted_avg.support
        )?;
        row(f, &self.macro_avg)?;
        row(f, &self.weighted_avg)
    }
}

/// Accuracy, confusion matrix and the classification report in one pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeldOutMetrics {
    pub accuracy: f64,
    pub confusion_matrix: Vec<Vec<usize>>,
    pub report: ClassificationReport,
    pub weighted_f1: f64,
}

/// `labels` followed by every other value seen in `y_true` or `y_pred`, in
/// ascending order, so that no held-out row falls off the matrix
pub fn label_axis(labels: &[f64], y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Vec<f64> {
    let known = |axis: &[f64], v: f64| axis.iter().any(|&l| (l - v).abs() < 0.5);
    let mut extra: Vec<f64> = Vec::new();
    for &v in y_true.iter().chain(y_pred.iter()) {
        if v.is_finite() && !known(labels, v) && !known(&extra, v) {
            extra.push(v);
        }
    }
    extra.sort_by(|a, b| a.total_cmp(b));
    labels.iter().copied().chain(extra).collect()
}

impl HeldOutMetrics {
    /// Metrics over the union of `labels` and the observed values. Classes
    /// outside `labels` are named by their numeric value.
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>, labels: &[f64], names: &[String]) -> Self {
        let axis = label_axis(labels, y_true, y_pred);
        let names: Vec<String> = axis
            .iter()
            .enumerate()
            .map(|(i, &v)| names.get(i).cloned().unwrap_or_else(|| format_numeric_label(v)))
            .collect();
        let confusion_matrix = confusion_matrix(y_true, y_pred, &axis);
        let report = ClassificationReport::from_confusion(&confusion_matrix, &names);
        Self {
            accuracy: accuracy_score(y_true, y_pred),
            weighted_f1: report.weighted_f1(),
            confusion_matrix,
            report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_accuracy() {
        let t = array![0.0, 1.0, 2.0, 2.0];
        let p = array![0.0, 1.0, 1.0, 2.0];
        assert!((accuracy_score(&t, &p) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_confusion_matrix() {
        let t = array![0.0, 1.0, 2.0, 2.0];
        let p = array![0.0, 1.0, 1.0, 2.0];
        let m = confusion_matrix(&t, &p, &[0.0, 1.0, 2.0]);
        assert_eq!(m, vec![vec![1, 0, 0], vec![0, 1, 0], vec![0, 1, 1]]);
    }

    #[test]
    fn test_report_values() {
        let m = vec![vec![1, 0, 0], vec![0, 1, 0], vec![0, 1, 1]];
        let names = vec!["high".to_string(), "low".to_string(), "medium".to_string()];
        let report = ClassificationReport::from_confusion(&m, &names);
        assert_eq!(report.classes[1].label, "low");
        assert!((report.classes[1].precision - 0.5).abs() < 1e-12);
        assert!((report.classes[2].recall - 0.5).abs() < 1e-12);
        // weighted F1 = (1*1 + 1*(2/3) + 2*(2/3)) / 4
        assert!((report.weighted_f1() - 0.75).abs() < 1e-12);

        let text = report.to_string();
        assert!(text.contains("precision"));
        assert!(text.contains("weighted avg"));
        assert!(text.contains("medium"));
    }

    #[test]
    fn test_prediction_outside_labels_keeps_every_row() {
        // Rounded regression scores may name a quality the test part lacks
        let t = array![5.0, 6.0, 6.0, 7.0, 5.0];
        let p = array![5.0, 6.0, 4.0, 7.0, 8.0];
        let labels = [5.0, 6.0, 7.0];
        let names = vec!["5".to_string(), "6".to_string(), "7".to_string()];
        let metrics = HeldOutMetrics::compute(&t, &p, &labels, &names);

        let rows: usize = metrics.confusion_matrix.iter().map(|r| r.iter().sum::<usize>()).sum();
        assert_eq!(rows, t.len());
        assert_eq!(metrics.confusion_matrix.len(), 5);
        assert_eq!(metrics.report.classes[3].label, "4");
        assert_eq!(metrics.report.classes[4].label, "8");
        assert_eq!(metrics.report.weighted_avg.support, t.len());
        assert!((metrics.report.accuracy - metrics.accuracy).abs() < 1e-12);
        // Class 5 has two rows, one of them missed
        assert!((metrics.report.classes[0].recall - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_inputs() {
        let empty = Array1::<f64>::zeros(0);
        assert_eq!(accuracy_score(&empty, &empty), 0.0);
        let metrics = HeldOutMetrics::compute(&empty, &empty, &[0.0, 1.0], &[]);
        assert_eq!(metrics.weighted_f1, 0.0);
    }
}
