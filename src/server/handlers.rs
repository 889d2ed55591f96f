//! HTTP request handlers

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        multipart::MultipartRejection,
        rejection::BytesRejection,
        FromRequest, Multipart, Request, State,
    },
    http::header::CONTENT_TYPE,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::charts::ChartSpec;
use crate::data::{
    prepare_upload, read_csv_bytes, validate_ranges, write_csv, DateRangeRequest, RangeValidation,
    SavedRanges, TimeRange, TrainTestRanges, UploadSummary,
};
use crate::error::InspectError;
use crate::metrics::{EvaluationReport, TrainingCurves};
use crate::predict::{PredictionResult, Predictor};
use crate::simulation::{event_stream, predict_window, TelemetryMock};
use crate::training::{EvaluationHistory, TrainingOutcome};

use super::error::{Result, ServerError};
use super::state::AppState;

/// Rows from this fraction onward form the evaluation slice
const EVALUATION_TAIL: f64 = 0.9;

// ============================================================================
// Request bodies
// ============================================================================

/// Train/test bounds. Accepts camelCase from JSON bodies and PascalCase from
/// the multipart `ranges` field.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainRequest {
    #[serde(alias = "TrainStart")]
    pub train_start: String,
    #[serde(alias = "TrainEnd")]
    pub train_end: String,
    #[serde(alias = "TestStart")]
    pub test_start: String,
    #[serde(alias = "TestEnd")]
    pub test_end: String,
}

impl TrainRequest {
    pub fn ranges(&self) -> crate::error::Result<TrainTestRanges> {
        Ok(TrainTestRanges {
            train: TimeRange::parse(&self.train_start, &self.train_end)?,
            test: TimeRange::parse(&self.test_start, &self.test_end)?,
        })
    }
}

#[derive(Default)]
struct MultipartParts {
    file: Option<(String, Bytes)>,
    ranges: Option<String>,
}

async fn read_multipart(mut multipart: Multipart) -> Result<MultipartParts> {
    let mut parts = MultipartParts::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "ranges" => {
                let text = field.text().await?;
                parts.ranges = Some(text);
            }
            _ => {
                let file_name = field.file_name().unwrap_or("upload.csv").to_string();
                let data = field.bytes().await?;
                info!(field = %name, file_name = %file_name, bytes = data.len(), "Received file");
                parts.file = Some((file_name, data));
            }
        }
    }
    Ok(parts)
}

// ============================================================================
// Training
// ============================================================================

/// Train from a JSON body against the stored dataset, or from a multipart
/// upload carrying both the CSV and its ranges
pub async fn train_model(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<Value>> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.starts_with("multipart/form-data"));

    if is_multipart {
        let multipart = Multipart::from_request(request, &state).await?;
        let parts = read_multipart(multipart).await?;
        let (_, csv) = parts
            .file
            .ok_or_else(|| ServerError::BadRequest("No file uploaded".to_string()))?;
        let raw = parts
            .ranges
            .ok_or_else(|| ServerError::BadRequest("Missing 'ranges' field".to_string()))?;
        let body: TrainRequest = serde_json::from_str(&raw)
            .map_err(|e| ServerError::BadRequest(format!("Invalid ranges: {}", e)))?;
        run_training(&state, Some(csv), body.ranges()?).await
    } else {
        let body = Bytes::from_request(request, &state).await?;
        let body: TrainRequest = serde_json::from_slice(&body)
            .map_err(|e| ServerError::BadRequest(format!("Invalid request body: {}", e)))?;
        run_training(&state, None, body.ranges()?).await
    }
}

/// Train with the ranges saved by date-range validation
pub async fn train_from_saved_ranges(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let ranges_path = state.ranges_path();
    if !state.dataset_path().is_file() || !ranges_path.is_file() {
        return Err(ServerError::BadRequest(
            "Missing processed dataset or ranges; upload and validate first.".to_string(),
        ));
    }

    let saved = SavedRanges::load(&ranges_path)?;
    let ranges = TrainTestRanges {
        train: saved.train()?,
        test: saved.test()?,
    };
    run_training(&state, None, ranges).await
}

async fn run_training(
    state: &Arc<AppState>,
    csv: Option<Bytes>,
    ranges: TrainTestRanges,
) -> Result<Json<Value>> {
    info!(train = %ranges.train, test = %ranges.test, "Training requested");

    let st = Arc::clone(state);
    let outcome = tokio::task::spawn_blocking(move || -> crate::error::Result<TrainingOutcome> {
        let dataset = match csv {
            Some(bytes) => st.loader.load_csv_bytes(&bytes)?,
            None => {
                let path = st.dataset_path();
                if !path.is_file() {
                    return Err(InspectError::ValidationError(
                        "No processed dataset found. Upload a dataset first.".to_string(),
                    ));
                }
                st.loader.load_csv_path(&path)?
            }
        };

        let outcome = st.trainer.train(&dataset, ranges)?;
        st.store.save(&outcome.model, &outcome.history)?;

        if st.config.charts_enabled {
            let curves = TrainingCurves::from_history(&outcome.history);
            let spec = ChartSpec::TrainingCurves {
                loss: curves.training_loss,
                accuracy: curves.training_accuracy,
            };
            if let Err(e) = st.renderer.render(&spec).and_then(|png| st.store.save_chart(&png)) {
                warn!(error = %e, "Could not write training chart");
            }
        }
        Ok(outcome)
    })
    .await??;

    let report = outcome.report;
    let model_id = outcome.model.model_id.clone();
    state.replace_model(Arc::new(outcome.model)).await;

    Ok(Json(json!({
        "status": "Model trained successfully",
        "model_id": model_id,
        "accuracy": report.accuracy,
        "precision": report.precision,
        "recall": report.recall,
        "f1_score": report.f1_score,
    })))
}

// ============================================================================
// Evaluation
// ============================================================================

/// Score the current model on the last tenth of an uploaded CSV
pub async fn evaluate_existing_model(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<EvaluationReport>> {
    let parts = read_multipart(multipart?).await?;
    let (file_name, csv) = parts
        .file
        .ok_or_else(|| ServerError::BadRequest("No file uploaded".to_string()))?;

    let model = state.current_model().await?;
    let st = Arc::clone(&state);
    let report = tokio::task::spawn_blocking(move || -> crate::error::Result<EvaluationReport> {
        let dataset = st.loader.load_csv_bytes(&csv)?;
        let history = match st.store.load_history() {
            Ok(h) => h,
            Err(InspectError::ModelNotFound(_)) => EvaluationHistory::default(),
            Err(e) => return Err(e),
        };

        let test = dataset.tail_from_fraction(EVALUATION_TAIL);
        let y_true = test.targets()?;
        let y_pred = model.predict_dataset(&test)?;

        let mut report = EvaluationReport::build(&y_true, &y_pred, &history);
        if st.config.charts_enabled {
            report.attach_charts(st.renderer.as_ref());
        }
        Ok(report)
    })
    .await??;

    info!(
        file_name = %file_name,
        accuracy = report.metrics.accuracy,
        f1_score = report.metrics.f1_score,
        "Evaluated existing model"
    );
    Ok(Json(report))
}

// ============================================================================
// Inference
// ============================================================================

pub async fn predict(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<PredictionResult>> {
    let body = body?;
    let value: Value = serde_json::from_slice(&body)
        .map_err(|e| ServerError::BadRequest(format!("Invalid JSON body: {}", e)))?;

    let model = state.current_model().await?;
    let columns = state.columns().clone();
    let mode = state.coercion_mode();

    let result = tokio::task::spawn_blocking(move || {
        Predictor::new(&model, &columns, mode).predict_value(&value)
    })
    .await??;

    info!(
        id = %result.id,
        prediction = ?result.prediction,
        confidence = result.confidence,
        "Prediction served"
    );
    Ok(Json(result))
}

// ============================================================================
// Dataset
// ============================================================================

/// Normalize an uploaded CSV and store it as the working dataset
pub async fn upload_dataset(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadSummary>> {
    let parts = read_multipart(multipart?).await?;
    let (file_name, csv) = match parts.file {
        Some((name, data)) if !data.is_empty() => (name, data),
        _ => return Err(ServerError::BadRequest("No file uploaded.".to_string())),
    };
    if !file_name.to_lowercase().ends_with(".csv") {
        return Err(ServerError::BadRequest("Only .csv files are allowed.".to_string()));
    }

    let st = Arc::clone(&state);
    let summary = tokio::task::spawn_blocking(move || -> crate::error::Result<UploadSummary> {
        let df = read_csv_bytes(&csv)?;
        let (mut df, summary) = prepare_upload(df, &file_name, st.columns())?;
        write_csv(&mut df, &st.dataset_path())?;
        Ok(summary)
    })
    .await??;

    info!(
        file_name = %summary.file_name,
        rows = summary.total_rows,
        columns = summary.total_cols,
        pass_rate = %summary.pass_rate,
        "Dataset stored"
    );
    Ok(Json(summary))
}

/// Check train/test/simulation windows against the stored dataset and save them
pub async fn validate_date_ranges(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<RangeValidation>> {
    let body = body?;
    let request: DateRangeRequest = serde_json::from_slice(&body)
        .map_err(|e| ServerError::BadRequest(format!("Invalid request body: {}", e)))?;

    if !state.dataset_path().is_file() {
        return Err(ServerError::BadRequest(
            "No processed dataset found. Upload a dataset first.".to_string(),
        ));
    }

    let st = Arc::clone(&state);
    let report = tokio::task::spawn_blocking(move || -> crate::error::Result<RangeValidation> {
        let dataset = st.loader.load_csv_path(&st.dataset_path())?;
        let (saved, report) = validate_ranges(dataset.timestamps(), &request)?;
        saved.save(&st.ranges_path())?;
        Ok(report)
    })
    .await??;

    info!(
        training = report.training.count,
        testing = report.testing.count,
        simulation = report.simulation.count,
        "Date ranges validated"
    );
    Ok(Json(report))
}

// ============================================================================
// Simulation
// ============================================================================

/// Stream predictions for the simulation window as server-sent events
pub async fn start_simulation(
    State(state): State<Arc<AppState>>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let ranges_path = state.ranges_path();
    if !state.dataset_path().is_file() || !ranges_path.is_file() {
        return Err(ServerError::NotFound(
            "Simulation requires a processed dataset and validated ranges.".to_string(),
        ));
    }

    let model = state.current_model().await?;
    let st = Arc::clone(&state);
    let results = tokio::task::spawn_blocking(move || -> crate::error::Result<Vec<PredictionResult>> {
        let window = SavedRanges::load(&ranges_path)?.simulation()?;
        let dataset = st.loader.load_csv_path(&st.dataset_path())?;
        predict_window(&model, &dataset, &window, st.columns())
    })
    .await??;

    let interval = Duration::from_millis(state.config.simulation_interval_ms);
    info!(rows = results.len(), interval_ms = state.config.simulation_interval_ms, "Simulation started");

    let stream = event_stream(results, interval, TelemetryMock::new()).map(|event| {
        let sse = Event::default().json_data(&event).unwrap_or_else(|e| {
            warn!(error = %e, "Could not encode simulation event");
            Event::default().comment("encoding error")
        });
        Ok::<Event, Infallible>(sse)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ============================================================================
// System
// ============================================================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cached = state.cached_model_id().await;
    Json(json!({
        "status": "ok",
        "model_loaded": cached.is_some() || state.store.exists(),
        "model_id": cached,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
