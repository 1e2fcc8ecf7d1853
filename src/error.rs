use thiserror::Error;

/// Everything that can go wrong between reading the dataset and writing an
/// export. Only the writers and argument parsing ever reach `main`; the rest
/// is recovered locally into a degraded but visible state.
#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Data unavailable at {path}: {reason}")]
    DataUnavailable { path: String, reason: String },

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("No data for {0}")]
    EmptySelection(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DashboardError {
    pub fn unavailable(path: &str, reason: impl ToString) -> Self {
        DashboardError::DataUnavailable {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;
