//! Error types for the influence engine
//!
//! Provides a single error enum shared by the engine and its drivers with:
//! - Distinct variants for configuration, schema, data and computation failures
//! - Stable machine-readable error codes
//! - Process exit code mapping for batch drivers

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using InfluenceError
pub type Result<T> = std::result::Result<T, InfluenceError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Configuration errors (1xxx)
    ConfigError,

    // Schema and data errors (2xxx)
    SchemaError,
    InvalidRecord,
    InvalidWeight,

    // Computation errors (3xxx)
    MissingSnapshot,
    InvalidVector,
    Cancelled,
    WorkerFailed,

    // Internal errors (9xxx)
    IoError,
    SerializationError,
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ConfigError => 1001,

            ErrorCode::SchemaError => 2001,
            ErrorCode::InvalidRecord => 2002,
            ErrorCode::InvalidWeight => 2003,

            ErrorCode::MissingSnapshot => 3001,
            ErrorCode::InvalidVector => 3002,
            ErrorCode::Cancelled => 3003,
            ErrorCode::WorkerFailed => 3004,

            ErrorCode::IoError => 9001,
            ErrorCode::SerializationError => 9002,
            ErrorCode::InternalError => 9999,
        }
    }

    /// Process exit code used by batch drivers
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorCode::ConfigError => 2,
            ErrorCode::SchemaError | ErrorCode::InvalidRecord | ErrorCode::InvalidWeight => 3,
            ErrorCode::MissingSnapshot | ErrorCode::InvalidVector | ErrorCode::WorkerFailed => 4,
            ErrorCode::Cancelled => 130,
            ErrorCode::IoError | ErrorCode::SerializationError | ErrorCode::InternalError => 1,
        }
    }
}

/// Engine error types
#[derive(Error, Debug)]
pub enum InfluenceError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Schema and data errors
    #[error("Missing column '{column}' in {table} table")]
    Schema { table: String, column: String },

    #[error("Invalid record in {table} table at row {row}: {message}")]
    InvalidRecord {
        table: String,
        row: usize,
        message: String,
    },

    #[error("Invalid weight {weight}: balancing requires a positive weight")]
    InvalidWeight { weight: f64 },

    // Computation errors
    #[error("No attribute snapshot for node {node} at timeframe {timeframe}")]
    MissingSnapshot { node: String, timeframe: i64 },

    #[error("Invalid vector: {message}")]
    InvalidVector { message: String },

    #[error("Computation cancelled")]
    Cancelled,

    #[error("Worker {worker} failed: {message}")]
    Worker { worker: usize, message: String },

    // Internal errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl InfluenceError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            InfluenceError::Config { .. } => ErrorCode::ConfigError,
            InfluenceError::Schema { .. } => ErrorCode::SchemaError,
            InfluenceError::InvalidRecord { .. } => ErrorCode::InvalidRecord,
            InfluenceError::InvalidWeight { .. } => ErrorCode::InvalidWeight,
            InfluenceError::MissingSnapshot { .. } => ErrorCode::MissingSnapshot,
            InfluenceError::InvalidVector { .. } => ErrorCode::InvalidVector,
            InfluenceError::Cancelled => ErrorCode::Cancelled,
            InfluenceError::Worker { .. } => ErrorCode::WorkerFailed,
            InfluenceError::Io(_) => ErrorCode::IoError,
            InfluenceError::Csv(_) | InfluenceError::Serialization(_) => {
                ErrorCode::SerializationError
            }
            InfluenceError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether the engine recovers from this error locally instead of aborting
    pub fn is_recoverable(&self) -> bool {
        matches!(self, InfluenceError::MissingSnapshot { .. })
    }

    /// Whether this error was raised by input validation, before any computation
    pub fn is_validation(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::ConfigError
                | ErrorCode::SchemaError
                | ErrorCode::InvalidRecord
                | ErrorCode::InvalidWeight
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        InfluenceError::Config {
            message: message.into(),
        }
    }

    pub fn schema(table: impl Into<String>, column: impl Into<String>) -> Self {
        InfluenceError::Schema {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn invalid_record(table: impl Into<String>, row: usize, message: impl Into<String>) -> Self {
        InfluenceError::InvalidRecord {
            table: table.into(),
            row,
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for InfluenceError {
    fn from(err: config::ConfigError) -> Self {
        InfluenceError::Config {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for InfluenceError {
    fn from(err: validator::ValidationErrors) -> Self {
        InfluenceError::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = InfluenceError::schema("edge", "p1");
        assert_eq!(err.code(), ErrorCode::SchemaError);
        assert_eq!(err.code().as_code(), 2001);
        assert_eq!(err.code().exit_code(), 3);
        assert_eq!(err.to_string(), "Missing column 'p1' in edge table");
    }

    #[test]
    fn test_missing_snapshot_is_recoverable() {
        let err = InfluenceError::MissingSnapshot {
            node: "42".into(),
            timeframe: 3,
        };
        assert!(err.is_recoverable());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_validation_errors() {
        assert!(InfluenceError::config("bad method").is_validation());
        assert!(InfluenceError::InvalidWeight { weight: 0.0 }.is_validation());
        assert!(!InfluenceError::Cancelled.is_validation());
        assert!(!InfluenceError::Cancelled.is_recoverable());
    }

    #[test]
    fn test_worker_error() {
        let err = InfluenceError::Worker {
            worker: 2,
            message: "panicked".into(),
        };
        assert_eq!(err.code(), ErrorCode::WorkerFailed);
        assert_eq!(err.code().exit_code(), 4);
    }
}
