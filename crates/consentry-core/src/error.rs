//! Error types for Consentry.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Host consent API is missing function: {0}")]
    MissingHostApi(String),

    #[error("Cookie error: {0}")]
    Cookie(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
