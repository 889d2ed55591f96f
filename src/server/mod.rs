//! IntelliInspect HTTP server
//!
//! REST API for dataset upload, range validation, model training,
//! evaluation, prediction and the simulation stream.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use handlers::TrainRequest;
pub use state::{AppState, RANGES_FILE};

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

fn env_parse<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Unrecognised values keep the default
fn env_flag(value: Option<String>, default: bool) -> bool {
    match value.map(|v| v.trim().to_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: String,
    pub models_dir: String,
    /// Working dataset written by uploads and read by training
    pub dataset_path: String,
    pub max_upload_size: usize,
    pub charts_enabled: bool,
    pub preload_model: bool,
    pub strict_features: bool,
    pub simulation_interval_ms: u64,
    pub balance_classes: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl ServerConfig {
    /// Build from a variable lookup, normally the process environment
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("DATA_DIR").unwrap_or_else(|| "./data".to_string());
        let dataset_path = lookup("DATASET_PATH").unwrap_or_else(|| format!("{}/processed.csv", data_dir));
        Self {
            host: lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: env_parse(lookup("API_PORT"), 8000),
            models_dir: lookup("MODELS_DIR").unwrap_or_else(|| "./models".to_string()),
            data_dir,
            dataset_path,
            max_upload_size: env_parse(lookup("MAX_UPLOAD_SIZE"), 100 * 1024 * 1024), // 100MB
            charts_enabled: env_flag(lookup("CHARTS_ENABLED"), true),
            preload_model: env_flag(lookup("PRELOAD_MODEL"), true),
            strict_features: env_flag(lookup("STRICT_FEATURES"), false),
            simulation_interval_ms: env_parse(lookup("SIMULATION_INTERVAL_MS"), 1000),
            balance_classes: env_flag(lookup("BALANCE_CLASSES"), true),
        }
    }

    /// Point data and model storage at new directories, keeping the
    /// dataset file inside the data directory
    pub fn with_dirs(mut self, data_dir: impl Into<String>, models_dir: impl Into<String>) -> Self {
        self.data_dir = data_dir.into();
        self.models_dir = models_dir.into();
        self.dataset_path = format!("{}/processed.csv", self.data_dir);
        self
    }
}

/// Start the server with the given configuration
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    info!(
        data_dir = %config.data_dir,
        models_dir = %config.models_dir,
        started_at = %start_time.to_rfc3339(),
        "Initializing server directories"
    );

    std::fs::create_dir_all(&config.data_dir)?;
    std::fs::create_dir_all(&config.models_dir)?;

    let state = Arc::new(AppState::new(config.clone()));
    if config.preload_model {
        state.preload().await;
    }
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        address = %addr,
        max_upload_size_mb = config.max_upload_size / 1024 / 1024,
        charts_enabled = config.charts_enabled,
        strict_features = config.strict_features,
        "IntelliInspect server starting"
    );
    info!(url = %format!("http://{}/api/health", addr), "Health endpoint available");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, pid = std::process::id(), "Server listening and ready to accept connections");

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
        let uptime = chrono::Utc::now().signed_duration_since(start_time);
        info!(uptime_secs = uptime.num_seconds(), "Shutdown signal received, stopping server gracefully");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}
