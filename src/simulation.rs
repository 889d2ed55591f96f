//! Replay of the simulation window as a paced stream of predictions

use crate::data::{ColumnConfig, Dataset, TimeRange};
use crate::error::Result;
use crate::metrics::round_to;
use crate::predict::{CoercionMode, PredictionResult, Predictor, Verdict};
use crate::training::TrainedModel;
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, StreamExt};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::Serialize;
use std::time::Duration;

/// One streamed prediction with mocked telemetry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SimulationEvent {
    pub sample_id: String,
    pub prediction: Verdict,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub pressure: f64,
    pub humidity: f64,
}

/// Uniform noise around fixed sensor baselines
pub struct TelemetryMock {
    rng: Xoshiro256PlusPlus,
}

impl TelemetryMock {
    pub fn new() -> Self {
        Self { rng: Xoshiro256PlusPlus::from_entropy() }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Xoshiro256PlusPlus::seed_from_u64(seed) }
    }

    fn around(&mut self, base: f64, spread: f64) -> f64 {
        round_to(self.rng.gen_range(base - spread..=base + spread), 2)
    }

    pub fn event(&mut self, result: PredictionResult) -> SimulationEvent {
        SimulationEvent {
            sample_id: result.id,
            prediction: result.prediction,
            confidence: result.confidence,
            timestamp: Utc::now(),
            temperature: self.around(20.0, 5.0),
            pressure: self.around(1010.0, 10.0),
            humidity: self.around(60.0, 15.0),
        }
    }
}

impl Default for TelemetryMock {
    fn default() -> Self {
        Self::new()
    }
}

/// Predict every row whose timestamp lies in `window`, in file order
pub fn predict_window(
    model: &TrainedModel,
    dataset: &Dataset,
    window: &TimeRange,
    columns: &ColumnConfig,
) -> Result<Vec<PredictionResult>> {
    let rows = dataset.slice_range(window)?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let x = rows.feature_matrix(&model.feature_names)?;
    let ids = rows.ids()?;
    Predictor::new(model, columns, CoercionMode::Lenient).predict_rows(&ids, &x)
}

/// Emit one event per result, `interval` apart
pub fn event_stream(
    results: Vec<PredictionResult>,
    interval: Duration,
    mut telemetry: TelemetryMock,
) -> impl Stream<Item = SimulationEvent> {
    let events: Vec<SimulationEvent> = results.into_iter().map(|r| telemetry.event(r)).collect();
    stream::iter(events.into_iter().enumerate()).then(move |(i, event)| async move {
        if i > 0 {
            tokio::time::sleep(interval).await;
        }
        SimulationEvent { timestamp: Utc::now(), ..event }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str) -> PredictionResult {
        PredictionResult::from_probability(id.to_string(), 0.9)
    }

    #[test]
    fn test_telemetry_within_bounds() {
        let mut mock = TelemetryMock::with_seed(1);
        for _ in 0..200 {
            let e = mock.event(result("1"));
            assert!((15.0..=25.0).contains(&e.temperature));
            assert!((1000.0..=1020.0).contains(&e.pressure));
            assert!((45.0..=75.0).contains(&e.humidity));
        }
    }

    #[test]
    fn test_event_serializes_pascal_case() {
        let e = TelemetryMock::with_seed(3).event(result("42"));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["SampleId"], "42");
        assert_eq!(json["Prediction"], "Pass");
        assert_eq!(json["Confidence"], 90.0);
        assert!(json["Timestamp"].is_string());
        assert!(json.get("Humidity").is_some());
    }

    #[tokio::test]
    async fn test_event_stream_preserves_order() {
        let stream = event_stream(
            vec![result("a"), result("b"), result("c")],
            Duration::from_millis(1),
            TelemetryMock::with_seed(9),
        );
        let ids: Vec<String> = stream.map(|e| e.sample_id).collect().await;
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
