//! Error types for the terminology client

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Terminology server error: {0}")]
    Terminology(String),

    #[error("Operation cancelled")]
    Cancelled,
}
