use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the loading, aggregation and forecasting layers.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// Source file missing, unreadable or corrupt.
    #[error("data unavailable at {}: {reason}", path.display())]
    DataUnavailable { path: PathBuf, reason: String },

    /// An expected column is absent from the source.
    #[error("column '{column}' missing from {}", path.display())]
    Schema { column: String, path: PathBuf },

    /// Filters matched zero rows.
    #[error("no data for the current selection: {0}")]
    EmptySelection(String),

    /// Too few points to fit a model for one category.
    #[error("'{key}' needs at least {needed} points to forecast, got {got}")]
    InsufficientHistory {
        key: String,
        needed: usize,
        got: usize,
    },

    /// A user-supplied parameter is out of range.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The numeric solver could not produce a fit.
    #[error("model fit failed: {0}")]
    Model(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DashboardError {
    pub fn unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        DashboardError::DataUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn missing_column(column: &str, path: impl Into<PathBuf>) -> Self {
        DashboardError::Schema {
            column: column.to_string(),
            path: path.into(),
        }
    }

    /// Whether the error ends the page render. Non-fatal errors become notices.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            DashboardError::EmptySelection(_)
                | DashboardError::InsufficientHistory { .. }
                | DashboardError::InvalidInput(_)
                | DashboardError::Model(_)
        )
    }
}

pub type Result<T, E = DashboardError> = std::result::Result<T, E>;
