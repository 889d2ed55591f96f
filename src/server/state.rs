//! Application state management

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::charts::{ChartRenderer, PlottersRenderer};
use crate::data::{ColumnConfig, DataLoader};
use crate::error::InspectError;
use crate::predict::CoercionMode;
use crate::store::{FileModelStore, ModelStore};
use crate::training::{Trainer, TrainedModel, TrainingConfig};

use super::ServerConfig;

pub const RANGES_FILE: &str = "ranges.json";

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<dyn ModelStore>,
    pub renderer: Arc<dyn ChartRenderer>,
    pub loader: DataLoader,
    pub trainer: Trainer,
    model: RwLock<Option<Arc<TrainedModel>>>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let store = Arc::new(FileModelStore::new(&config.models_dir));
        let training = TrainingConfig {
            balance_classes: config.balance_classes,
            ..Default::default()
        };
        Self::with_parts(config, store, Arc::new(PlottersRenderer::default()), training)
    }

    pub fn with_parts(
        config: ServerConfig,
        store: Arc<dyn ModelStore>,
        renderer: Arc<dyn ChartRenderer>,
        training: TrainingConfig,
    ) -> Self {
        Self {
            config,
            store,
            renderer,
            loader: DataLoader::new(ColumnConfig::default()),
            trainer: Trainer::new(training),
            model: RwLock::new(None),
        }
    }

    pub fn columns(&self) -> &ColumnConfig {
        self.loader.columns()
    }

    pub fn coercion_mode(&self) -> CoercionMode {
        if self.config.strict_features {
            CoercionMode::Strict
        } else {
            CoercionMode::Lenient
        }
    }

    pub fn dataset_path(&self) -> PathBuf {
        PathBuf::from(&self.config.dataset_path)
    }

    pub fn ranges_path(&self) -> PathBuf {
        PathBuf::from(&self.config.data_dir).join(RANGES_FILE)
    }

    /// The cached model, loading it from the store on first use
    pub async fn current_model(&self) -> Result<Arc<TrainedModel>, InspectError> {
        if let Some(model) = self.model.read().await.as_ref() {
            return Ok(Arc::clone(model));
        }

        let mut slot = self.model.write().await;
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }

        let store = Arc::clone(&self.store);
        let model = tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| InspectError::CorruptModel(format!("model load task failed: {}", e)))??;
        let model = Arc::new(model);
        info!(model_id = %model.model_id, "Loaded model into cache");
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Swap in a freshly trained model
    pub async fn replace_model(&self, model: Arc<TrainedModel>) {
        *self.model.write().await = Some(model);
    }

    pub async fn cached_model_id(&self) -> Option<String> {
        self.model.read().await.as_ref().map(|m| m.model_id.clone())
    }

    /// Load the persisted model at startup when one exists
    pub async fn preload(&self) {
        if !self.store.exists() {
            info!("No persisted model to preload");
            return;
        }
        if let Err(e) = self.current_model().await {
            warn!(error = %e, "Failed to preload model");
        }
    }
}
