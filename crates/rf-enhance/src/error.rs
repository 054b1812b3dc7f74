//! Error types for audio enhancement

use thiserror::Error;

/// Enhancement error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnhanceError {
    /// Invalid configuration (raised by `initialize` / `configure` only)
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Engine used before `initialize`
    #[error("Enhancement engine not initialized")]
    Uninitialized,

    /// Engine used after `dispose`
    #[error("Enhancement engine disposed")]
    Disposed,

    /// Malformed input buffer
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// FFT failure inside the transform core
    #[error("Transform error: {0}")]
    Transform(String),
}

/// Result type for enhancement operations
pub type EnhanceResult<T> = Result<T, EnhanceError>;
