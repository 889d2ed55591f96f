//! IntelliInspect - time-windowed pass/fail classification service
//!
//! Trains a gradient-boosted binary classifier on the rows of a CSV that fall
//! inside a timestamp window, persists it, and serves predictions and
//! evaluation metrics over HTTP.
//!
//! # Modules
//!
//! - [`data`] - CSV loading, timestamp windows, upload preparation
//! - [`training`] - boosted trees, class balancing, training pipeline
//! - [`metrics`] - classification report, confusion matrix, curves
//! - [`charts`] - PNG line and donut charts
//! - [`store`] - model persistence
//! - [`predict`] - JSON record coercion and scoring
//! - [`simulation`] - paced replay of the simulation window
//! - [`server`] - HTTP API
//! - [`cli`] - command-line interface

pub mod error;

pub mod data;
pub mod training;
pub mod metrics;
pub mod charts;
pub mod store;
pub mod predict;
pub mod simulation;

pub mod server;
pub mod cli;

pub use error::{InspectError, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{InspectError, Result};

    pub use crate::data::{ColumnConfig, DataLoader, Dataset, TimeRange, TrainTestRanges};
    pub use crate::training::{
        BoostedClassifier, BoosterConfig, EvaluationHistory, Trainer, TrainedModel,
        TrainingConfig, TrainingOutcome,
    };
    pub use crate::metrics::{ClassificationReport, ConfusionCounts, EvaluationReport};
    pub use crate::charts::{ChartRenderer, ChartSpec, PlottersRenderer};
    pub use crate::store::{FileModelStore, ModelStore};
    pub use crate::predict::{CoercionMode, PredictionResult, Predictor, Verdict};
    pub use crate::server::{create_router, AppState, ServerConfig};
}
