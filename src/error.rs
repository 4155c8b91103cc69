//! Error types for duet.

use thiserror::Error;

/// Failures talking to the messaging gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network failure, timeout, or connection reset
    #[error("gateway transport error: {0}")]
    Transport(String),

    /// The platform answered but rejected the call
    #[error("gateway rejected {method}: {description} (code {code})")]
    Rejected {
        method: String,
        code: i64,
        description: String,
    },

    /// The platform answered with a payload we could not decode
    #[error("gateway response decode error: {0}")]
    Decode(String),
}

/// Failures in the admission registry backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid challenge reference: {0}")]
    InvalidChallenge(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
