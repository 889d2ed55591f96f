//! Persistence of the trained model, its evaluation history and chart

use crate::error::{InspectError, Result};
use crate::training::{EvaluationHistory, TrainedModel};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const MODEL_FILE: &str = "trained_model.json";
pub const HISTORY_FILE: &str = "training_history.json";
pub const CHART_FILE: &str = "training_metrics.png";

/// Storage for the single current model. Every save overwrites the previous one.
pub trait ModelStore: Send + Sync {
    fn save(&self, model: &TrainedModel, history: &EvaluationHistory) -> Result<()>;

    /// `ModelNotFound` when nothing has been saved, `CorruptModel` when the
    /// stored bytes do not deserialize
    fn load(&self) -> Result<TrainedModel>;

    fn load_history(&self) -> Result<EvaluationHistory>;

    fn save_chart(&self, png: &[u8]) -> Result<()>;

    fn exists(&self) -> bool;
}

/// JSON files under one directory, written via temp file + rename
#[derive(Debug, Clone)]
pub struct FileModelStore {
    dir: PathBuf,
}

impl FileModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE)
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    pub fn chart_path(&self) -> PathBuf {
        self.dir.join(CHART_FILE)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), bytes = bytes.len(), "Wrote file");
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let json = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(InspectError::ModelNotFound(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&json)
            .map_err(|e| InspectError::CorruptModel(format!("{}: {}", path.display(), e)))
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_vec(value)?;
        self.write_atomic(path, &json)
    }
}

impl ModelStore for FileModelStore {
    fn save(&self, model: &TrainedModel, history: &EvaluationHistory) -> Result<()> {
        self.write_json(&self.history_path(), history)?;
        self.write_json(&self.model_path(), model)
    }

    fn load(&self) -> Result<TrainedModel> {
        self.read_json(&self.model_path())
    }

    fn load_history(&self) -> Result<EvaluationHistory> {
        self.read_json(&self.history_path())
    }

    fn save_chart(&self, png: &[u8]) -> Result<()> {
        self.write_atomic(&self.chart_path(), png)
    }

    fn exists(&self) -> bool {
        self.model_path().is_file()
    }
}
