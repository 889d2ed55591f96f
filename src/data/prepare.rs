//! Dataset preparation: header normalization, synthetic timestamps and
//! validation of the train/test/simulation windows.

use crate::error::{InspectError, Result};
use chrono::{Duration, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::dataset::{resolve_column, ColumnConfig};
use super::range::{format_timestamp, parse_timestamp, TimeRange};

/// First synthetic timestamp; subsequent rows advance one second each
pub fn synthetic_epoch() -> NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2021, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Summary returned after an upload has been normalized and stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub file_name: String,
    pub total_rows: usize,
    pub total_cols: usize,
    pub pass_rate: String,
    pub date_range: String,
}

/// Lowercase every header, require the target column and append synthetic
/// timestamps when the timestamp column is absent.
pub fn prepare_upload(
    mut df: DataFrame,
    file_name: &str,
    columns: &ColumnConfig,
) -> Result<(DataFrame, UploadSummary)> {
    lowercase_headers(&mut df)?;

    let target = columns.target.to_lowercase();
    let timestamp = columns.timestamp.to_lowercase();

    if resolve_column(&df, &target).is_none() {
        return Err(InspectError::ValidationError(format!(
            "The uploaded file does not contain a '{}' column.",
            columns.target
        )));
    }

    if resolve_column(&df, &timestamp).is_none() {
        add_synthetic_timestamps(&mut df, &timestamp)?;
    }

    let total_rows = df.height();
    let pass_count = df
        .column(&target)?
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .filter(|v| *v == Some(1.0))
        .count();
    let pass_rate = if total_rows > 0 {
        pass_count as f64 / total_rows as f64 * 100.0
    } else {
        0.0
    };

    let stamps = df.column(&timestamp)?.cast(&DataType::String)?;
    let stamps = stamps.str()?;
    let first = stamps.get(0).unwrap_or_default().to_string();
    let last = stamps
        .get(total_rows.saturating_sub(1))
        .unwrap_or_default()
        .to_string();

    let summary = UploadSummary {
        file_name: file_name.to_string(),
        total_rows,
        total_cols: df.width(),
        pass_rate: format!("{:.2}%", pass_rate),
        date_range: format!("{} to {}", first, last),
    };

    Ok((df, summary))
}

fn lowercase_headers(df: &mut DataFrame) -> Result<()> {
    let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    for name in names {
        let lower = name.to_lowercase();
        if lower != name {
            df.rename(&name, lower.as_str().into()).map_err(|e| {
                InspectError::ValidationError(format!("cannot normalize header '{}': {}", name, e))
            })?;
        }
    }
    Ok(())
}

/// Append `column` holding one-second increments from [`synthetic_epoch`]
pub fn add_synthetic_timestamps(df: &mut DataFrame, column: &str) -> Result<()> {
    let epoch = synthetic_epoch();
    let values: Vec<String> = (0..df.height())
        .map(|i| format_timestamp(&(epoch + Duration::seconds(i as i64))))
        .collect();
    df.with_column(Series::new(column.into(), values))?;
    Ok(())
}

pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .map_err(|e| InspectError::SerializationError(e.to_string()))?;
    Ok(())
}

/// Window bounds as submitted for validation
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DateRangeRequest {
    pub train_start: String,
    pub train_end: String,
    pub test_start: String,
    pub test_end: String,
    pub sim_start: String,
    pub sim_end: String,
}

/// Validated windows persisted as `ranges.json`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SavedRanges {
    pub train_start: NaiveDateTime,
    pub train_end: NaiveDateTime,
    pub test_start: NaiveDateTime,
    pub test_end: NaiveDateTime,
    pub sim_start: NaiveDateTime,
    pub sim_end: NaiveDateTime,
}

impl SavedRanges {
    pub fn train(&self) -> Result<TimeRange> {
        TimeRange::new(self.train_start, self.train_end)
    }

    pub fn test(&self) -> Result<TimeRange> {
        TimeRange::new(self.test_start, self.test_end)
    }

    pub fn simulation(&self) -> Result<TimeRange> {
        TimeRange::new(self.sim_start, self.sim_end)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| InspectError::ParseError(format!("invalid ranges file: {}", e)))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WindowCount {
    pub count: usize,
    pub range: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OverallSpan {
    pub earliest: NaiveDateTime,
    pub latest: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RangeValidation {
    pub status: String,
    pub training: WindowCount,
    pub testing: WindowCount,
    pub simulation: WindowCount,
    pub overall: OverallSpan,
}

/// Check that the three windows are well formed, ordered
/// (train < test < simulation) and inside the dataset's time span, and count
/// the rows that fall in each.
pub fn validate_ranges(
    timestamps: &[NaiveDateTime],
    request: &DateRangeRequest,
) -> Result<(SavedRanges, RangeValidation)> {
    let parse = |raw: &str| {
        parse_timestamp(raw).map_err(|_| InspectError::ValidationError("Invalid date format.".to_string()))
    };

    let ranges = SavedRanges {
        train_start: parse(&request.train_start)?,
        train_end: parse(&request.train_end)?,
        test_start: parse(&request.test_start)?,
        test_end: parse(&request.test_end)?,
        sim_start: parse(&request.sim_start)?,
        sim_end: parse(&request.sim_end)?,
    };

    let (train, test, sim) = match (ranges.train(), ranges.test(), ranges.simulation()) {
        (Ok(a), Ok(b), Ok(c)) => (a, b, c),
        _ => {
            return Err(InspectError::ValidationError(
                "Each range must start before it ends.".to_string(),
            ))
        }
    };

    if train.end >= test.start || test.end >= sim.start {
        return Err(InspectError::ValidationError(
            "Date ranges must be non-overlapping and in order: Train < Test < Sim.".to_string(),
        ));
    }

    let (earliest, latest) = match (timestamps.iter().min(), timestamps.iter().max()) {
        (Some(min), Some(max)) => (*min, *max),
        _ => return Err(InspectError::ValidationError("Dataset has no rows.".to_string())),
    };

    if train.start < earliest || sim.end > latest {
        return Err(InspectError::ValidationError(format!(
            "Selected date ranges must be within dataset range: {} to {}",
            format_timestamp(&earliest),
            format_timestamp(&latest)
        )));
    }

    let (mut n_train, mut n_test, mut n_sim) = (0, 0, 0);
    for ts in timestamps {
        if train.contains(ts) {
            n_train += 1;
        } else if test.contains(ts) {
            n_test += 1;
        } else if sim.contains(ts) {
            n_sim += 1;
        }
    }

    let report = RangeValidation {
        status: "Valid".to_string(),
        training: WindowCount { count: n_train, range: train.to_string() },
        testing: WindowCount { count: n_test, range: test.to_string() },
        simulation: WindowCount { count: n_sim, range: sim.to_string() },
        overall: OverallSpan { earliest, latest },
    };

    Ok((ranges, report))
}
