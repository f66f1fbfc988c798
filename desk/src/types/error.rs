//! Error types for the complaint desk

use complaint_triage::{ConfigError, PipelineError, StoreError};

/// Main error type for desk operations
#[derive(Debug, thiserror::Error)]
pub enum DeskError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeskError {
    /// Process exit code for the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BadRequest(_) => 2,
            Self::Forbidden(_) => 3,
            Self::NotFound(_) => 4,
            Self::Database(_) | Self::Oracle(_) => 5,
            Self::Config(_) => 78,
            Self::Serialization(_) | Self::Internal(_) => 1,
        }
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for DeskError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for DeskError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON error: {}", err))
    }
}

impl From<mongodb::error::Error> for DeskError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::ser::Error> for DeskError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Serialization(format!("BSON encode error: {}", err))
    }
}

impl From<bson::de::Error> for DeskError {
    fn from(err: bson::de::Error) -> Self {
        Self::Serialization(format!("BSON decode error: {}", err))
    }
}

impl From<ConfigError> for DeskError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for DeskError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("Task failed: {}", err))
    }
}

impl From<StoreError> for DeskError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Serialization(msg) => Self::Serialization(msg),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<PipelineError> for DeskError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Store(e) => e.into(),
            PipelineError::NotFound(id) => Self::NotFound(format!("Complaint {}", id)),
            PipelineError::Forbidden(msg) => Self::Forbidden(msg),
            e @ PipelineError::InvalidTransition { .. } => Self::BadRequest(e.to_string()),
            PipelineError::InvalidRequest(msg) => Self::BadRequest(msg),
        }
    }
}

/// The store adapter reports through the core crate's error type.
impl From<DeskError> for StoreError {
    fn from(err: DeskError) -> Self {
        match err {
            DeskError::Serialization(msg) => StoreError::Serialization(msg),
            DeskError::Database(msg) => StoreError::Query(msg),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Result type alias for desk operations
pub type Result<T> = std::result::Result<T, DeskError>;
