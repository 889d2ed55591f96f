//! CSV loading into a [`Dataset`]

use crate::error::{InspectError, Result};
use polars::prelude::*;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

use super::dataset::{ColumnConfig, Dataset};

/// Number of rows polars inspects when inferring column types
const INFER_SCHEMA_ROWS: usize = 1000;

/// Loads CSV input and validates the special columns
#[derive(Debug, Clone, Default)]
pub struct DataLoader {
    columns: ColumnConfig,
}

impl DataLoader {
    pub fn new(columns: ColumnConfig) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &ColumnConfig {
        &self.columns
    }

    /// Parse an uploaded CSV body
    pub fn load_csv_bytes(&self, bytes: &[u8]) -> Result<Dataset> {
        let start = Instant::now();
        let df = read_csv_bytes(bytes)?;
        let dataset = Dataset::from_frame(df, &self.columns)?;
        debug!(
            rows = dataset.height(),
            columns = dataset.width(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Parsed CSV upload"
        );
        Ok(dataset)
    }

    /// Read a CSV file from disk
    pub fn load_csv_path(&self, path: &Path) -> Result<Dataset> {
        let start = Instant::now();
        let df = read_csv_path(path)?;
        let dataset = Dataset::from_frame(df, &self.columns)?;
        debug!(
            path = %path.display(),
            rows = dataset.height(),
            columns = dataset.width(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded dataset"
        );
        Ok(dataset)
    }
}

/// Raw CSV parse without any column validation
pub fn read_csv_bytes(bytes: &[u8]) -> Result<DataFrame> {
    if bytes.is_empty() {
        return Err(InspectError::ParseError("CSV body is empty".to_string()));
    }

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .map_err(|e| InspectError::ParseError(format!("CSV parse error: {}", e)))
}

pub fn read_csv_path(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)?;

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .into_reader_with_file_handle(file)
        .finish()
        .map_err(|e| InspectError::ParseError(format!("CSV parse error: {}", e)))
}
