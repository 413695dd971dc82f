use thiserror::Error;

/// Top-level error type for the sped-core crate and dependents.
#[derive(Debug, Error)]
pub enum SpedError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("processing cancelled")]
    Cancelled,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, SpedError>;
