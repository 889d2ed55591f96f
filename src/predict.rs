//! Single-record prediction from loosely typed JSON

use crate::data::ColumnConfig;
use crate::error::{InspectError, Result};
use crate::metrics::round_to;
use crate::training::TrainedModel;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::warn;

/// How values that are not numbers are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoercionMode {
    /// Substitute 0.0 and log a warning
    #[default]
    Lenient,
    /// Reject with `FeatureCoercion`
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Prediction")]
    pub prediction: Verdict,
    #[serde(rename = "Confidence")]
    pub confidence: f64,
}

impl PredictionResult {
    /// Result for a body that cannot be interpreted as a record
    pub fn fallback() -> Self {
        Self {
            id: "unknown".to_string(),
            prediction: Verdict::Fail,
            confidence: 0.0,
        }
    }

    /// `Pass` iff the positive class wins; confidence is the winning
    /// probability as a percentage with two decimals
    pub fn from_probability(id: String, p: f64) -> Self {
        let prediction = if p > 0.5 { Verdict::Pass } else { Verdict::Fail };
        Self {
            id,
            prediction,
            confidence: round_to(100.0 * p.max(1.0 - p), 2),
        }
    }
}

/// Convert one JSON value to a feature value
pub fn coerce_value(field: &str, value: &Value, mode: CoercionMode) -> Result<f64> {
    let parsed = match value {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Array(_) | Value::Object(_) => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => match mode {
            CoercionMode::Strict => Err(InspectError::FeatureCoercion {
                field: field.to_string(),
                value: value.to_string(),
            }),
            CoercionMode::Lenient => {
                warn!(field = %field, value = %value, "Non-numeric feature replaced with 0.0");
                Ok(0.0)
            }
        },
    }
}

fn stringify_id(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "unknown".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Assembles feature vectors in a model's column order and scores them
pub struct Predictor<'a> {
    model: &'a TrainedModel,
    columns: &'a ColumnConfig,
    mode: CoercionMode,
}

impl<'a> Predictor<'a> {
    pub fn new(model: &'a TrainedModel, columns: &'a ColumnConfig, mode: CoercionMode) -> Self {
        Self { model, columns, mode }
    }

    /// Split a record into its id and a feature vector. Keys match
    /// case-insensitively, unknown keys are ignored and absent features are 0.0.
    pub fn features(&self, record: &Map<String, Value>) -> Result<(String, Array1<f64>)> {
        let mut id = None;
        let mut by_name: HashMap<String, (&str, &Value)> = HashMap::with_capacity(record.len());

        for (key, value) in record {
            if key.eq_ignore_ascii_case(&self.columns.id) {
                id = Some(value);
            } else if key.eq_ignore_ascii_case(&self.columns.timestamp) {
                continue;
            } else {
                by_name.insert(key.to_lowercase(), (key.as_str(), value));
            }
        }

        let values = self
            .model
            .feature_names
            .iter()
            .map(|name| match by_name.get(&name.to_lowercase()) {
                Some((key, value)) => coerce_value(key, value, self.mode),
                None => Ok(0.0),
            })
            .collect::<Result<Vec<f64>>>()?;

        Ok((stringify_id(id), Array1::from_vec(values)))
    }

    pub fn predict_record(&self, record: &Map<String, Value>) -> Result<PredictionResult> {
        let (id, features) = self.features(record)?;
        let n = features.len();
        let x = features.into_shape_with_order((1, n))?;
        let proba = self.model.predict_proba(&x)?;
        let p = proba.first().copied().unwrap_or(0.0);
        Ok(PredictionResult::from_probability(id, p))
    }

    /// Entry point for request bodies. Non-object bodies yield the fallback
    /// result in lenient mode and a `ParseError` in strict mode.
    pub fn predict_value(&self, body: &Value) -> Result<PredictionResult> {
        match body.as_object() {
            Some(record) => self.predict_record(record),
            None => match self.mode {
                CoercionMode::Strict => Err(InspectError::ParseError(
                    "prediction body must be a JSON object".to_string(),
                )),
                CoercionMode::Lenient => {
                    warn!(body = %body, "Prediction body is not an object, returning fallback");
                    Ok(PredictionResult::fallback())
                }
            },
        }
    }

    /// Score a matrix already in the model's feature order
    pub fn predict_rows(&self, ids: &[String], x: &Array2<f64>) -> Result<Vec<PredictionResult>> {
        let proba = self.model.predict_proba(x)?;
        Ok(ids
            .iter()
            .zip(proba.iter())
            .map(|(id, &p)| PredictionResult::from_probability(id.clone(), p))
            .collect())
    }
}
