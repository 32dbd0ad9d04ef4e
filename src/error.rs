use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised synchronously by the statistics engine.
///
/// Missing data for a night or stage is never an error; it shows up as a
/// null value in the result instead.
#[derive(Debug, Error)]
pub enum StatisticsError {
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Unknown reduction: {0} (expected mean, std, min or max)")]
    UnknownReduction(String),

    #[error("Invalid date range: end {end} is before start {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Invalid clock time: {0}")]
    InvalidTime(String),

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Failures of the loader collaborator, reported per user.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),
}
