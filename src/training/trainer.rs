//! Training pipeline: slice by range, balance, fit, score on the test window

use crate::data::{Dataset, TrainTestRanges};
use crate::error::{InspectError, Result};
use crate::metrics::ClassificationReport;
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use super::balance::{stratified_split, RandomUnderSampler, Sampler};
use super::booster::{BoostedClassifier, BoosterConfig, EvaluationHistory};

/// Training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub booster: BoosterConfig,
    /// Undersample the majority class and hold out a stratified eval set
    pub balance_classes: bool,
    /// Fraction of each class held out for evaluation when balancing
    pub eval_fraction: f64,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            booster: BoosterConfig::default(),
            balance_classes: true,
            eval_fraction: 0.2,
            seed: 42,
        }
    }
}

/// A fitted booster plus everything needed to reuse it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub model_id: String,
    pub trained_at: DateTime<Utc>,
    /// Column order of the feature matrix the booster was fit on
    pub feature_names: Vec<String>,
    pub ranges: TrainTestRanges,
    pub train_rows: usize,
    pub test_rows: usize,
    pub fit_rows: usize,
    pub eval_rows: usize,
    booster: BoostedClassifier,
}

impl TrainedModel {
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.booster.predict_proba(x)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.booster.predict(x)
    }

    /// Predict every row of `dataset`, aligning its columns to the model's
    /// feature order
    pub fn predict_dataset(&self, dataset: &Dataset) -> Result<Array1<f64>> {
        let x = dataset.feature_matrix(&self.feature_names)?;
        self.booster.predict(&x)
    }
}

/// Result of one training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: TrainedModel,
    pub history: EvaluationHistory,
    /// Scores on the test window
    pub report: ClassificationReport,
}

#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn train(&self, dataset: &Dataset, ranges: TrainTestRanges) -> Result<TrainingOutcome> {
        let start = Instant::now();

        let train = dataset.slice_range(&ranges.train)?;
        let test = dataset.slice_range(&ranges.test)?;
        if train.is_empty() {
            return Err(InspectError::TrainingError(format!(
                "no rows in training range {}",
                ranges.train
            )));
        }

        let feature_names = dataset.feature_names();
        debug!(
            target_column = dataset.target_column(),
            features = feature_names.len(),
            "Resolved training columns"
        );
        let x_train = train.feature_matrix(&feature_names)?;
        let y_train = train.targets()?;

        let (x_fit, y_fit, x_eval, y_eval) = if self.config.balance_classes {
            let sampler = RandomUnderSampler::new().with_seed(self.config.seed);
            let (x_bal, y_bal) = sampler.resample(&x_train, &y_train)?;
            let split = stratified_split(&y_bal, self.config.eval_fraction, self.config.seed);
            debug!(
                balanced_rows = y_bal.len(),
                fit_rows = split.fit.len(),
                eval_rows = split.held_out.len(),
                "Balanced training slice"
            );
            (
                x_bal.select(Axis(0), &split.fit),
                y_bal.select(Axis(0), &split.fit),
                x_bal.select(Axis(0), &split.held_out),
                y_bal.select(Axis(0), &split.held_out),
            )
        } else {
            (x_train.clone(), y_train.clone(), x_train, y_train)
        };

        let mut booster = BoostedClassifier::new(self.config.booster.clone());
        let history = booster.fit_with_eval(&x_fit, &y_fit, Some((&x_eval, &y_eval)))?;

        let model = TrainedModel {
            model_id: uuid::Uuid::new_v4().to_string(),
            trained_at: Utc::now(),
            feature_names,
            ranges,
            train_rows: train.height(),
            test_rows: test.height(),
            fit_rows: y_fit.len(),
            eval_rows: y_eval.len(),
            booster,
        };

        let y_test = test.targets()?;
        let y_pred = model.predict_dataset(&test)?;
        let report = ClassificationReport::compute(&y_test, &y_pred);

        info!(
            model_id = %model.model_id,
            train_rows = model.train_rows,
            test_rows = model.test_rows,
            accuracy = report.accuracy,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model trained"
        );

        Ok(TrainingOutcome { model, history, report })
    }
}
