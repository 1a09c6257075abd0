//! Common error types for popsongs

use thiserror::Error;

/// Common result type for popsongs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while assembling the run configuration
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Required environment variable is unset or blank
    #[error("Missing environment variable: {0}")]
    MissingEnv(String),

    /// Invalid user input or setting value
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
