//! Classification metrics, confusion matrix and training curves

use crate::charts::{ChartRenderer, ChartSpec};
use crate::training::EvaluationHistory;
use base64::Engine as _;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Accuracy, precision, recall and F1 for the positive class, rounded to
/// four decimals
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

impl ClassificationReport {
    /// Zero denominators yield 0
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let counts = ConfusionCounts::tally(y_true, y_pred);
        let total = counts.tp + counts.tn + counts.fp + counts.fn_;

        let ratio = |num: usize, den: usize| if den > 0 { num as f64 / den as f64 } else { 0.0 };

        let accuracy = ratio(counts.tp + counts.tn, total);
        let precision = ratio(counts.tp, counts.tp + counts.fp);
        let recall = ratio(counts.tp, counts.tp + counts.fn_);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            accuracy: round_to(accuracy, 4),
            precision: round_to(precision, 4),
            recall: round_to(recall, 4),
            f1_score: round_to(f1_score, 4),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

impl ConfusionCounts {
    /// Raw counts, values above 0.5 taken as the positive class
    pub fn tally(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let mut counts = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t > 0.5, p > 0.5) {
                (true, true) => counts.tp += 1,
                (false, true) => counts.fp += 1,
                (false, false) => counts.tn += 1,
                (true, false) => counts.fn_ += 1,
            }
        }
        counts
    }

    /// Counts as reported next to a confusion matrix. When only one label was
    /// observed the matrix is 1x1 and only its diagonal cell is reported.
    pub fn from_observed(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let raw = Self::tally(y_true, y_pred);
        match observed_labels(y_true, y_pred).as_slice() {
            [0] => Self { tn: raw.tn, ..Self::default() },
            [1] => Self { tp: raw.tp, ..Self::default() },
            [] => Self::default(),
            _ => raw,
        }
    }
}

fn observed_labels(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Vec<u8> {
    let mut seen = [false; 2];
    for &v in y_true.iter().chain(y_pred.iter()) {
        seen[usize::from(v > 0.5)] = true;
    }
    (0..2u8).filter(|&l| seen[l as usize]).collect()
}

/// Matrix over the sorted observed labels, rows actual and columns predicted:
/// `[[tn, fp], [fn, tp]]`, `[[n]]` for a single label, empty without rows
pub fn confusion_matrix(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Vec<Vec<usize>> {
    let counts = ConfusionCounts::tally(y_true, y_pred);
    match observed_labels(y_true, y_pred).as_slice() {
        [] => Vec::new(),
        [0] => vec![vec![counts.tn]],
        [1] => vec![vec![counts.tp]],
        _ => vec![vec![counts.tn, counts.fp], vec![counts.fn_, counts.tp]],
    }
}

/// Per-round curves derived from the evaluation history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingCurves {
    pub training_accuracy: Vec<f64>,
    pub training_loss: Vec<f64>,
}

impl TrainingCurves {
    pub fn from_history(history: &EvaluationHistory) -> Self {
        let training_loss: Vec<f64> = history.logloss.iter().map(|&l| round_to(l, 4)).collect();
        let training_accuracy = if history.error.is_empty() {
            history.logloss.iter().map(|&l| round_to(1.0 - l, 4)).collect()
        } else {
            history.error.iter().map(|&e| round_to(1.0 - e, 4)).collect()
        };
        Self { training_accuracy, training_loss }
    }
}

/// Full response of a model evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    #[serde(flatten)]
    pub metrics: ClassificationReport,
    pub confusion_matrix: Vec<Vec<usize>>,
    #[serde(flatten)]
    pub curves: TrainingCurves,
    pub confusion_counts: ConfusionCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_chart: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donut_chart: Option<String>,
}

impl EvaluationReport {
    pub fn build(y_true: &Array1<f64>, y_pred: &Array1<f64>, history: &EvaluationHistory) -> Self {
        Self {
            metrics: ClassificationReport::compute(y_true, y_pred),
            confusion_matrix: confusion_matrix(y_true, y_pred),
            curves: TrainingCurves::from_history(history),
            confusion_counts: ConfusionCounts::from_observed(y_true, y_pred),
            line_chart: None,
            donut_chart: None,
        }
    }

    /// Render both charts as base64 PNG. A rendering failure is logged and
    /// leaves that chart out.
    pub fn attach_charts(&mut self, renderer: &dyn ChartRenderer) {
        let line = ChartSpec::TrainingCurves {
            loss: self.curves.training_loss.clone(),
            accuracy: self.curves.training_accuracy.clone(),
        };
        let donut = ChartSpec::ConfusionDonut(self.confusion_counts);

        self.line_chart = render_base64(renderer, &line);
        self.donut_chart = render_base64(renderer, &donut);
    }
}

fn render_base64(renderer: &dyn ChartRenderer, spec: &ChartSpec) -> Option<String> {
    match renderer.render(spec) {
        Ok(png) => Some(base64::engine::general_purpose::STANDARD.encode(png)),
        Err(e) => {
            warn!(chart = spec.name(), error = %e, "Chart rendering failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InspectError, Result};
    use ndarray::array;

    #[test]
    fn test_classification_report() {
        let y_true = array![1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let y_pred = array![1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0];
        let report = ClassificationReport::compute(&y_true, &y_pred);
        assert_eq!(report.accuracy, 0.75);
        assert_eq!(report.precision, 0.75);
        assert_eq!(report.recall, 0.75);
        assert_eq!(report.f1_score, 0.75);
    }

    #[test]
    fn test_zero_denominators() {
        let y_true = array![0.0, 0.0, 0.0];
        let y_pred = array![0.0, 0.0, 0.0];
        let report = ClassificationReport::compute(&y_true, &y_pred);
        assert_eq!(report.accuracy, 1.0);
        assert_eq!(report.precision, 0.0);
        assert_eq!(report.recall, 0.0);
        assert_eq!(report.f1_score, 0.0);

        let empty = Array1::<f64>::zeros(0);
        assert_eq!(ClassificationReport::compute(&empty, &empty), ClassificationReport::default());
    }

    #[test]
    fn test_rounding_to_four_decimals() {
        let y_true = array![1.0, 1.0, 1.0];
        let y_pred = array![1.0, 0.0, 0.0];
        let report = ClassificationReport::compute(&y_true, &y_pred);
        assert_eq!(report.accuracy, 0.3333);
        assert_eq!(report.f1_score, 0.5);
    }

    #[test]
    fn test_confusion_matrix_shapes() {
        let y_true = array![0.0, 1.0, 1.0, 0.0];
        let y_pred = array![0.0, 1.0, 0.0, 1.0];
        let cm = confusion_matrix(&y_true, &y_pred);
        assert_eq!(cm, vec![vec![1, 1], vec![1, 1]]);
        let counts = ConfusionCounts::from_observed(&y_true, &y_pred);
        assert_eq!(counts.tp + counts.tn + counts.fp + counts.fn_, 4);

        let ones = array![1.0, 1.0];
        assert_eq!(confusion_matrix(&ones, &ones), vec![vec![2]]);
        assert_eq!(
            ConfusionCounts::from_observed(&ones, &ones),
            ConfusionCounts { tp: 2, ..Default::default() }
        );

        let empty = Array1::<f64>::zeros(0);
        assert!(confusion_matrix(&empty, &empty).is_empty());
    }

    #[test]
    fn test_counts_serialize_fn_key() {
        let json = serde_json::to_value(ConfusionCounts { tp: 1, tn: 2, fp: 3, fn_: 4 }).unwrap();
        assert_eq!(json["fn"], 4);
    }

    #[test]
    fn test_curves_prefer_error_history() {
        let history = EvaluationHistory {
            logloss: vec![0.69314, 0.5],
            error: vec![0.5, 0.25],
        };
        let curves = TrainingCurves::from_history(&history);
        assert_eq!(curves.training_loss, vec![0.6931, 0.5]);
        assert_eq!(curves.training_accuracy, vec![0.5, 0.75]);

        let loss_only = EvaluationHistory { logloss: vec![0.4], error: vec![] };
        assert_eq!(TrainingCurves::from_history(&loss_only).training_accuracy, vec![0.6]);
    }

    struct FailingRenderer;

    impl ChartRenderer for FailingRenderer {
        fn render(&self, _spec: &ChartSpec) -> Result<Vec<u8>> {
            Err(InspectError::ChartError("no backend".to_string()))
        }
    }

    #[test]
    fn test_chart_failure_leaves_report_intact() {
        let y = array![1.0, 0.0];
        let mut report = EvaluationReport::build(&y, &y, &EvaluationHistory::default());
        report.attach_charts(&FailingRenderer);
        assert!(report.line_chart.is_none());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["accuracy"], 1.0);
        assert!(json.get("donut_chart").is_none());
        assert!(json["training_loss"].as_array().unwrap().is_empty());
    }
}
