//! Error types for model loading

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid FHIR version: {0}")]
    InvalidFhirVersion(String),

    #[error("Model data error: {0}")]
    ModelData(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
