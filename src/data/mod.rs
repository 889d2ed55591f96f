//! Data layer: CSV loading, timestamp windows and upload preparation

mod dataset;
mod loader;
mod prepare;
mod range;

pub use dataset::{resolve_column, ColumnConfig, Dataset};
pub use loader::{read_csv_bytes, read_csv_path, DataLoader};
pub use prepare::{
    add_synthetic_timestamps, prepare_upload, synthetic_epoch, validate_ranges, write_csv,
    DateRangeRequest, OverallSpan, RangeValidation, SavedRanges, UploadSummary, WindowCount,
};
pub use range::{format_timestamp, parse_timestamp, TimeRange, TrainTestRanges};
