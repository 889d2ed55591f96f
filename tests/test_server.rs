//! Integration test: Server API endpoints

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use base64::Engine as _;
use intelli_inspect::charts::PlottersRenderer;
use intelli_inspect::server::{create_router, AppState, ServerConfig};
use intelli_inspect::store::FileModelStore;
use intelli_inspect::training::TrainingConfig;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "intelli-inspect-test-boundary";

fn test_config(dir: &TempDir) -> ServerConfig {
    let data_dir = dir.path().join("data").display().to_string();
    let models_dir = dir.path().join("models").display().to_string();
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        dataset_path: format!("{}/processed.csv", data_dir),
        data_dir,
        models_dir,
        max_upload_size: 10 * 1024 * 1024,
        charts_enabled: false,
        preload_model: false,
        strict_features: false,
        simulation_interval_ms: 1,
        balance_classes: true,
    }
}

fn test_app_with(config: ServerConfig) -> axum::Router {
    let store = Arc::new(FileModelStore::new(&config.models_dir));
    let renderer = Arc::new(PlottersRenderer { width: 160, height: 120 });
    let state = Arc::new(AppState::with_parts(config, store, renderer, TrainingConfig::default()));
    create_router(state)
}

fn test_app(dir: &TempDir) -> axum::Router {
    test_app_with(test_config(dir))
}

/// `n` daily rows alternating Fail/Pass, starting 2021-01-01
fn daily_csv(n: usize) -> String {
    let mut csv = String::from("id,f1,f2,Response,synthetic_timestamp\n");
    for i in 0..n {
        let label = i % 2;
        csv.push_str(&format!(
            "{},{:.1},{:.1},{},2021-01-{:02} 00:00:00\n",
            i + 1,
            label as f64 * 4.0 + (i % 3) as f64 * 0.1,
            (i % 4) as f64,
            label,
            i + 1
        ));
    }
    csv
}

/// Rows whose label is fixed per half: first `n/2` all Pass, rest all Fail
fn split_label_csv(n: usize) -> String {
    let mut csv = String::from("id,f1,Response,synthetic_timestamp\n");
    for i in 0..n {
        let label = if i < n / 2 { 1 } else { 0 };
        csv.push_str(&format!("{},1.0,{},2021-01-{:02} 00:00:00\n", i + 1, label, i + 1));
    }
    csv
}

fn multipart(parts: &[(&str, Option<&str>, &str)]) -> Body {
    let mut body = String::new();
    for (name, file_name, content) in parts {
        body.push_str(&format!("--{}\r\n", BOUNDARY));
        match file_name {
            Some(f) => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: text/csv\r\n\r\n",
                name, f
            )),
            None => body.push_str(&format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)),
        }
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));
    Body::from(body)
}

fn multipart_request(uri: &str, parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(multipart(parts))
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn ranges_json(train: (&str, &str), test: (&str, &str)) -> String {
    json!({
        "TrainStart": train.0, "TrainEnd": train.1,
        "TestStart": test.0, "TestEnd": test.1,
    })
    .to_string()
}

async fn train_upload(app: &axum::Router, csv: &str, train: (&str, &str), test: (&str, &str)) -> Value {
    let ranges = ranges_json(train, test);
    let (status, body) = send(
        app,
        multipart_request("/train-model", &[("file", Some("train.csv"), csv), ("ranges", None, &ranges)]),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "train failed: {}", body);
    body
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(&test_app(&dir), get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["model_loaded"], false);
}

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(&test_app(&dir), get("/api/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn test_ten_row_scenario() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let body = train_upload(
        &app,
        &daily_csv(10),
        ("2021-01-01", "2021-01-07"),
        ("2021-01-08", "2021-01-10"),
    )
    .await;

    assert_eq!(body["status"], "Model trained successfully");
    for key in ["accuracy", "precision", "recall", "f1_score"] {
        let v = body[key].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&v), "{} = {}", key, v);
    }
    assert!(dir.path().join("models/trained_model.json").is_file());
    assert!(dir.path().join("models/training_history.json").is_file());
}

#[tokio::test]
async fn test_train_without_dataset_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let body = json!({
        "trainStart": "2021-01-01", "trainEnd": "2021-01-07",
        "testStart": "2021-01-08", "testEnd": "2021-01-10",
    });
    let (status, body) = send(&test_app(&dir), json_request("POST", "/api/train-model", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn test_inverted_range_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let ranges = ranges_json(("2021-01-07", "2021-01-01"), ("2021-01-08", "2021-01-10"));
    let (status, _) = send(
        &app,
        multipart_request("/train-model", &[("file", Some("t.csv"), &daily_csv(10)), ("ranges", None, &ranges)]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bad_timestamp_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let csv = "f1,Response,synthetic_timestamp\n1.0,0,someday\n";
    let ranges = ranges_json(("2021-01-01", "2021-01-07"), ("2021-01-08", "2021-01-10"));
    let (status, body) = send(
        &app,
        multipart_request("/train-model", &[("file", Some("t.csv"), csv), ("ranges", None, &ranges)]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("someday"));
}

#[tokio::test]
async fn test_predict_without_model_is_not_found() {
    let dir = TempDir::new().unwrap();
    let (status, _) = send(&test_app(&dir), json_request("POST", "/api/predict", json!({"f1": 1}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_predict_with_missing_features() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    train_upload(&app, &daily_csv(20), ("2021-01-01", "2021-01-14"), ("2021-01-15", "2021-01-20")).await;

    let (status, body) = send(&app, json_request("POST", "/api/predict", json!({"id": 99}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["Id"], "99");
    assert!(body["Prediction"] == "Pass" || body["Prediction"] == "Fail");
    let confidence = body["Confidence"].as_f64().unwrap();
    assert!((0.0..=100.0).contains(&confidence));

    let (status, body) = send(&app, json_request("POST", "/api/predict", json!([1, 2, 3]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"Id": "unknown", "Prediction": "Fail", "Confidence": 0.0}));
}

#[tokio::test]
async fn test_strict_mode_rejects_non_numeric_feature() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.strict_features = true;
    let app = test_app_with(config);
    train_upload(&app, &daily_csv(20), ("2021-01-01", "2021-01-14"), ("2021-01-15", "2021-01-20")).await;

    let (status, body) = send(&app, json_request("POST", "/api/predict", json!({"f1": "abc"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("f1"));

    let (status, _) = send(&app, json_request("POST", "/api/predict", json!("text"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_retrain_overwrites_model() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let csv = split_label_csv(20);
    let probe = json!({"id": "probe", "f1": 1.0});

    let first = train_upload(&app, &csv, ("2021-01-01", "2021-01-10"), ("2021-01-11", "2021-01-20")).await;
    let (_, p1) = send(&app, json_request("POST", "/api/predict", probe.clone())).await;
    assert_eq!(p1["Prediction"], "Pass");

    let second = train_upload(&app, &csv, ("2021-01-11", "2021-01-20"), ("2021-01-01", "2021-01-10")).await;
    let (_, p2) = send(&app, json_request("POST", "/api/predict", probe)).await;
    assert_eq!(p2["Prediction"], "Fail");

    assert_ne!(first["model_id"], second["model_id"]);
    let stored: Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("models/trained_model.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(stored["model_id"], second["model_id"]);

    let (_, health) = send(&app, get("/api/health")).await;
    assert_eq!(health["model_id"], second["model_id"]);
}

#[tokio::test]
async fn test_evaluate_is_repeatable() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    let csv = daily_csv(30);
    train_upload(&app, &csv, ("2021-01-01", "2021-01-20"), ("2021-01-21", "2021-01-30")).await;

    let (s1, a) = send(&app, multipart_request("/evaluate-existing-model", &[("file", Some("e.csv"), &csv)])).await;
    let (s2, b) = send(&app, multipart_request("/evaluate-existing-model", &[("file", Some("e.csv"), &csv)])).await;
    assert_eq!(s1, StatusCode::OK);
    assert_eq!(s2, StatusCode::OK);
    assert_eq!(a, b);

    assert_eq!(a["training_loss"].as_array().unwrap().len(), 100);
    assert_eq!(a["training_accuracy"].as_array().unwrap().len(), 100);
    assert!(a.get("line_chart").is_none());

    // floor(30 * 0.9) = 27, so three rows are scored
    let counts = &a["confusion_counts"];
    let total: u64 = ["tp", "tn", "fp", "fn"].iter().map(|k| counts[k].as_u64().unwrap()).sum();
    let matrix = a["confusion_matrix"].as_array().unwrap();
    if matrix.len() == 2 {
        assert_eq!(total, 3);
    }
}

#[tokio::test]
async fn test_evaluate_with_charts() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.charts_enabled = true;
    let app = test_app_with(config);
    let csv = daily_csv(20);
    train_upload(&app, &csv, ("2021-01-01", "2021-01-14"), ("2021-01-15", "2021-01-20")).await;
    assert!(dir.path().join("models/training_metrics.png").is_file());

    let (status, body) = send(&app, multipart_request("/evaluate-existing-model", &[("file", Some("e.csv"), &csv)])).await;
    assert_eq!(status, StatusCode::OK);
    for key in ["line_chart", "donut_chart"] {
        let png = base64::engine::general_purpose::STANDARD
            .decode(body[key].as_str().unwrap())
            .unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}

#[tokio::test]
async fn test_evaluate_without_model_is_not_found() {
    let dir = TempDir::new().unwrap();
    let (status, _) = send(
        &test_app(&dir),
        multipart_request("/evaluate-existing-model", &[("file", Some("e.csv"), &daily_csv(10))]),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

fn upload_csv(n: usize) -> String {
    let mut csv = String::from("Id,F1,F2,Response\n");
    for i in 0..n {
        csv.push_str(&format!("{},{:.1},{},{}\n", i, (i % 2) as f64 * 3.0, i % 5, i % 2));
    }
    csv
}

#[tokio::test]
async fn test_upload_rejects_bad_files() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let (status, _) = send(&app, multipart_request("/api/dataset/upload", &[("file", Some("data.txt"), "a,b\n1,2\n")])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, multipart_request("/api/dataset/upload", &[("file", Some("data.csv"), "a,b\n1,2\n")])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("response"));

    let (status, _) = send(&app, multipart_request("/api/dataset/upload", &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_validate_train_simulate_flow() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    let (status, summary) = send(
        &app,
        multipart_request("/api/dataset/upload", &[("file", Some("Sensors.CSV"), &upload_csv(40))]),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", summary);
    assert_eq!(summary["fileName"], "Sensors.CSV");
    assert_eq!(summary["totalRows"], 40);
    assert_eq!(summary["totalCols"], 5);
    assert_eq!(summary["passRate"], "50.00%");
    assert_eq!(summary["dateRange"], "2021-01-01 00:00:00 to 2021-01-01 00:00:39");

    // Saved ranges are required before training from them
    let (status, _) = send(&app, get("/api/model/train")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let ranges = json!({
        "TrainStart": "2021-01-01 00:00:00", "TrainEnd": "2021-01-01 00:00:19",
        "TestStart": "2021-01-01 00:00:20", "TestEnd": "2021-01-01 00:00:29",
        "SimStart": "2021-01-01 00:00:30", "SimEnd": "2021-01-01 00:00:39",
    });
    let (status, report) = send(&app, json_request("POST", "/api/dataset/validate-date-ranges", ranges)).await;
    assert_eq!(status, StatusCode::OK, "{}", report);
    assert_eq!(report["status"], "Valid");
    assert_eq!(report["training"]["count"], 20);
    assert_eq!(report["testing"]["count"], 10);
    assert_eq!(report["simulation"]["count"], 10);
    assert!(dir.path().join("data/ranges.json").is_file());

    let (status, trained) = send(&app, get("/api/model/train")).await;
    assert_eq!(status, StatusCode::OK, "{}", trained);
    assert!(trained["accuracy"].as_f64().is_some());

    let response = app.clone().oneshot(get("/api/simulation/start")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let events: Vec<Value> = text
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .map(|d| serde_json::from_str(d).unwrap())
        .collect();
    assert_eq!(events.len(), 10);
    assert_eq!(events[0]["SampleId"], "30");
    assert!(events.iter().all(|e| e.get("Temperature").is_some()));
}

#[tokio::test]
async fn test_validate_rejects_overlapping_ranges() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);
    send(&app, multipart_request("/api/dataset/upload", &[("file", Some("d.csv"), &upload_csv(40))])).await;

    let ranges = json!({
        "TrainStart": "2021-01-01 00:00:00", "TrainEnd": "2021-01-01 00:00:25",
        "TestStart": "2021-01-01 00:00:20", "TestEnd": "2021-01-01 00:00:29",
        "SimStart": "2021-01-01 00:00:30", "SimEnd": "2021-01-01 00:00:39",
    });
    let (status, body) = send(&app, json_request("POST", "/api/dataset/validate-date-ranges", ranges)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn test_simulation_without_ranges_is_not_found() {
    let dir = TempDir::new().unwrap();
    let (status, _) = send(&test_app(&dir), get("/api/simulation/start")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_non_multipart_bodies_get_json_errors() {
    let dir = TempDir::new().unwrap();
    let app = test_app(&dir);

    for uri in ["/evaluate-existing-model", "/api/dataset/upload"] {
        let (status, body) = send(&app, json_request("POST", uri, json!({"file": "x.csv"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["error"], true, "{}", uri);
        assert!(body["message"].is_string(), "{}", uri);
    }
}

#[tokio::test]
async fn test_oversized_predict_body_is_json_413() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.max_upload_size = 1024;
    let app = test_app_with(config);

    let padding = "x".repeat(4096);
    let (status, body) = send(&app, json_request("POST", "/api/predict", json!({"pad": padding}))).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], true);
    assert!(body["message"].is_string());
}
