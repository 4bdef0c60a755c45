use thiserror::Error;

#[derive(Error, Debug)]
pub enum PvmError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Malformed field model: {0}")]
    MalformedFieldModel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::error::PolarsError> for PvmError {
    fn from(err: polars::error::PolarsError) -> Self {
        PvmError::Polars(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PvmError>;
