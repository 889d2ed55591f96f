//! In-memory tabular dataset with a parsed timestamp column

use crate::error::{InspectError, Result};
use chrono::NaiveDateTime;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::range::{parse_timestamp, TimeRange};

/// Names of the special columns. Matching against the CSV header is
/// case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub target: String,
    pub timestamp: String,
    pub id: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            target: "response".to_string(),
            timestamp: "synthetic_timestamp".to_string(),
            id: "id".to_string(),
        }
    }
}

/// Find the actual header name matching `wanted`, ignoring case
pub fn resolve_column(df: &DataFrame, wanted: &str) -> Option<String> {
    df.get_column_names()
        .iter()
        .map(|name| name.to_string())
        .find(|name| name.eq_ignore_ascii_case(wanted))
}

/// A loaded table plus the resolved names of its special columns.
///
/// `timestamps[i]` is the parsed timestamp of row `i` of `df`; every
/// row-selecting operation keeps the two in lockstep.
#[derive(Debug, Clone)]
pub struct Dataset {
    df: DataFrame,
    timestamps: Vec<NaiveDateTime>,
    target_column: String,
    timestamp_column: String,
    id_column: Option<String>,
}

impl Dataset {
    /// Validate required columns and parse the timestamp column
    pub fn from_frame(df: DataFrame, columns: &ColumnConfig) -> Result<Self> {
        let timestamp_column = resolve_column(&df, &columns.timestamp).ok_or_else(|| {
            InspectError::ParseError(format!("missing timestamp column '{}'", columns.timestamp))
        })?;
        let target_column = resolve_column(&df, &columns.target).ok_or_else(|| {
            InspectError::ParseError(format!("missing target column '{}'", columns.target))
        })?;
        let id_column = resolve_column(&df, &columns.id);

        let timestamps = parse_timestamp_column(&df, &timestamp_column)?;

        Ok(Self {
            df,
            timestamps,
            target_column,
            timestamp_column,
            id_column,
        })
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    pub fn width(&self) -> usize {
        self.df.width()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn target_column(&self) -> &str {
        &self.target_column
    }

    /// Every column except target, timestamp and identifier, in header order
    pub fn feature_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .filter(|name| {
                name != &self.target_column
                    && name != &self.timestamp_column
                    && self.id_column.as_deref() != Some(name.as_str())
            })
            .collect()
    }

    /// Binary target, with values above 0.5 treated as the positive class
    pub fn targets(&self) -> Result<Array1<f64>> {
        let values = column_as_f64(&self.df, &self.target_column)?;
        Ok(values.into_iter().map(|v| if v > 0.5 { 1.0 } else { 0.0 }).collect())
    }

    /// Row identifiers as strings, falling back to the row position
    pub fn ids(&self) -> Result<Vec<String>> {
        match &self.id_column {
            Some(col) => {
                let series = self.df.column(col)?.cast(&DataType::String)?;
                let ids = series
                    .str()?
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| v.map(|s| s.to_string()).unwrap_or_else(|| i.to_string()))
                    .collect();
                Ok(ids)
            }
            None => Ok((0..self.height()).map(|i| i.to_string()).collect()),
        }
    }

    /// Extract named columns into a row-major matrix. Columns absent from this
    /// table and null cells become `0.0`.
    pub fn feature_matrix(&self, names: &[String]) -> Result<Array2<f64>> {
        let n_rows = self.df.height();
        let col_data: Vec<Vec<f64>> = names
            .iter()
            .map(|name| match resolve_column(&self.df, name) {
                Some(actual) => column_as_f64(&self.df, &actual),
                None => Ok(vec![0.0; n_rows]),
            })
            .collect::<Result<Vec<Vec<f64>>>>()?;

        let col_refs: Vec<&[f64]> = col_data.iter().map(|c| c.as_slice()).collect();
        Ok(Array2::from_shape_fn((n_rows, names.len()), |(r, c)| col_refs[c][r]))
    }

    /// Rows whose timestamp falls inside `range`, in original order
    pub fn slice_range(&self, range: &TimeRange) -> Result<Self> {
        let keep: Vec<bool> = self.timestamps.iter().map(|ts| range.contains(ts)).collect();
        self.filter_rows(&keep)
    }

    /// Rows `[floor(n * fraction), n)`
    pub fn tail_from_fraction(&self, fraction: f64) -> Self {
        let n = self.height();
        let start = ((n as f64) * fraction.clamp(0.0, 1.0)).floor() as usize;
        let start = start.min(n);
        Self {
            df: self.df.slice(start as i64, n - start),
            timestamps: self.timestamps[start..].to_vec(),
            target_column: self.target_column.clone(),
            timestamp_column: self.timestamp_column.clone(),
            id_column: self.id_column.clone(),
        }
    }

    fn filter_rows(&self, keep: &[bool]) -> Result<Self> {
        let mask = BooleanChunked::from_slice("mask".into(), keep);
        let df = self.df.filter(&mask)?;
        let timestamps = self
            .timestamps
            .iter()
            .zip(keep.iter())
            .filter(|&(_, &k)| k)
            .map(|(ts, _)| *ts)
            .collect();

        Ok(Self {
            df,
            timestamps,
            target_column: self.target_column.clone(),
            timestamp_column: self.timestamp_column.clone(),
            id_column: self.id_column.clone(),
        })
    }
}

fn parse_timestamp_column(df: &DataFrame, column: &str) -> Result<Vec<NaiveDateTime>> {
    let series = df.column(column)?.cast(&DataType::String)?;
    series
        .str()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            let raw = value.ok_or_else(|| {
                InspectError::ParseError(format!("row {}: missing value in '{}'", row + 1, column))
            })?;
            parse_timestamp(raw).map_err(|e| {
                InspectError::ParseError(format!("row {}: {}", row + 1, e))
            })
        })
        .collect()
}

fn column_as_f64(df: &DataFrame, column: &str) -> Result<Vec<f64>> {
    let series = df
        .column(column)
        .map_err(|_| InspectError::ColumnNotFound(column.to_string()))?;
    let series_f64 = series.cast(&DataType::Float64)?;
    let values = series_f64
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()).unwrap_or(0.0))
        .collect();
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> DataFrame {
        df!(
            "Id" => &[1i64, 2, 3, 4],
            "f1" => &[0.5, 1.5, 2.5, 3.5],
            "f2" => &[10.0, 20.0, 30.0, 40.0],
            "Response" => &[0i64, 1, 0, 1],
            "synthetic_timestamp" => &[
                "2021-01-01 00:00:00",
                "2021-01-02 00:00:00",
                "2021-01-03 00:00:00",
                "2021-01-04 00:00:00",
            ]
        )
        .unwrap()
    }

    #[test]
    fn test_special_columns_resolved_case_insensitively() {
        let ds = Dataset::from_frame(sample_frame(), &ColumnConfig::default()).unwrap();
        assert_eq!(ds.target_column(), "Response");
        assert_eq!(ds.feature_names(), vec!["f1".to_string(), "f2".to_string()]);
        assert_eq!(ds.ids().unwrap(), vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn test_missing_timestamp_column() {
        let df = sample_frame().drop("synthetic_timestamp").unwrap();
        let err = Dataset::from_frame(df, &ColumnConfig::default()).unwrap_err();
        assert!(matches!(err, InspectError::ParseError(_)));
    }

    #[test]
    fn test_missing_target_column() {
        let df = sample_frame().drop("Response").unwrap();
        assert!(Dataset::from_frame(df, &ColumnConfig::default()).is_err());
    }

    #[test]
    fn test_slice_range_keeps_rows_in_bounds() {
        let ds = Dataset::from_frame(sample_frame(), &ColumnConfig::default()).unwrap();
        let range = TimeRange::parse("2021-01-02", "2021-01-03").unwrap();
        let sliced = ds.slice_range(&range).unwrap();
        assert_eq!(sliced.height(), 2);
        assert!(sliced.timestamps().iter().all(|ts| range.contains(ts)));
        assert_eq!(sliced.targets().unwrap().to_vec(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_empty_slice_is_allowed() {
        let ds = Dataset::from_frame(sample_frame(), &ColumnConfig::default()).unwrap();
        let range = TimeRange::parse("2022-01-01", "2022-02-01").unwrap();
        let sliced = ds.slice_range(&range).unwrap();
        assert!(sliced.is_empty());
        assert!(sliced.timestamps().is_empty());
    }

    #[test]
    fn test_feature_matrix_zero_fills_unknown_columns() {
        let ds = Dataset::from_frame(sample_frame(), &ColumnConfig::default()).unwrap();
        let names = vec!["f2".to_string(), "missing".to_string()];
        let x = ds.feature_matrix(&names).unwrap();
        assert_eq!(x.dim(), (4, 2));
        assert_eq!(x[[1, 0]], 20.0);
        assert_eq!(x[[3, 1]], 0.0);
    }

    #[test]
    fn test_feature_matrix_zero_fills_non_finite_cells() {
        let df = df!(
            "f1" => &[1.0, f64::NAN, f64::INFINITY],
            "response" => &[0i64, 1, 0],
            "synthetic_timestamp" => &["2021-01-01", "2021-01-02", "2021-01-03"],
        )
        .unwrap();
        let ds = Dataset::from_frame(df, &ColumnConfig::default()).unwrap();
        let x = ds.feature_matrix(&["f1".to_string()]).unwrap();
        assert_eq!(x.column(0).to_vec(), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_tail_from_fraction() {
        let ds = Dataset::from_frame(sample_frame(), &ColumnConfig::default()).unwrap();
        let tail = ds.tail_from_fraction(0.9);
        // floor(4 * 0.9) = 3
        assert_eq!(tail.height(), 1);
        assert_eq!(tail.timestamps().len(), 1);
    }
}
