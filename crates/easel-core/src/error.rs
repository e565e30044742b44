//! Unified error types for Easel

use thiserror::Error;

/// Unified error type for all Easel operations
#[derive(Error, Debug)]
pub enum EaselError {
    // Browser errors
    #[error("Browser error: {0}")]
    Browser(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Exchange-file errors
    #[error("Exchange error: {0}")]
    Exchange(String),

    // Artifact errors
    #[error("Artifact error: {0}")]
    Artifact(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using EaselError
pub type Result<T> = std::result::Result<T, EaselError>;
