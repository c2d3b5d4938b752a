//! Error types and handling
//!
//! Common error types used across the capture engine. Only session lifecycle
//! boundaries (start/stop) surface these; per-tick work logs and carries on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::project::bundle::BundleError;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CaptureError {
    /// Stable code for host-side diagnostics
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::Io(_) => "IO_ERROR",
            CaptureError::Serialization(_) => "SERIALIZATION_ERROR",
            CaptureError::Session(_) => "SESSION_ERROR",
            CaptureError::Device(_) => "DEVICE_ERROR",
            CaptureError::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl From<BundleError> for CaptureError {
    fn from(error: BundleError) -> Self {
        match error {
            BundleError::Io(e) => CaptureError::Io(e),
            BundleError::Json(e) => CaptureError::Serialization(e),
            other => CaptureError::Session(other.to_string()),
        }
    }
}

/// Error report handed to embedding hosts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<CaptureError> for ErrorResponse {
    fn from(error: CaptureError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using CaptureError
pub type CaptureResult<T> = Result<T, CaptureError>;
