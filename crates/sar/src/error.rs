//! Error types for SAR fitting and scoring
//!
//! Configuration and parameter problems are raised at `fit`/`recommend`
//! entry before any matrix is built. Cold users and items are never errors
//! unless the caller explicitly asks for [`UnknownPolicy::Reject`].
//!
//! [`UnknownPolicy::Reject`]: crate::types::UnknownPolicy::Reject

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SarError>;

#[derive(Debug, Error)]
pub enum SarError {
    /// Unsupported metric, decay without timestamps, missing columns
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        key: Option<String>,
    },

    /// Out-of-range numeric parameter (half-life, top_k, threshold)
    #[error("Invalid parameter `{name}`: {message}")]
    InvalidParameter { name: String, message: String },

    /// Malformed interaction row, detected before aggregation
    #[error("Invalid interaction at row {row}: {message}")]
    Validation { row: usize, message: String },

    #[error("Unknown {kind}: {id}")]
    UnknownEntity { kind: &'static str, id: String },

    #[error("Sparse matrix error: {message}")]
    Matrix { message: String },

    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SarError {
    pub fn configuration(message: impl Into<String>, key: Option<&str>) -> Self {
        SarError::Configuration {
            message: message.into(),
            key: key.map(str::to_string),
        }
    }

    pub fn invalid_parameter(name: &str, message: impl Into<String>) -> Self {
        SarError::InvalidParameter {
            name: name.to_string(),
            message: message.into(),
        }
    }

    pub fn validation(row: usize, message: impl Into<String>) -> Self {
        SarError::Validation {
            row,
            message: message.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, SarError::Configuration { .. })
    }

    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, SarError::InvalidParameter { .. })
    }
}

impl From<config::ConfigError> for SarError {
    fn from(err: config::ConfigError) -> Self {
        SarError::Configuration {
            message: err.to_string(),
            key: None,
        }
    }
}
